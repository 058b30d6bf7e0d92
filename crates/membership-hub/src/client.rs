//! Authenticated HTTP plumbing shared by every Hub call

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use membership_common::{Error, Result, DEFAULT_LOCATION};

use crate::auth::TokenSource;
use crate::{CLOUD_PLATFORM_SCOPE, DEFAULT_ENDPOINT};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for a [`HubClient`]
///
/// A client is scoped to one project and location.
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// API endpoint, e.g. `https://gkehub.googleapis.com/`
    pub base_url: String,
    /// Project owning the memberships
    pub project: String,
    /// Membership location
    pub location: String,
    /// User-Agent header value
    pub user_agent: String,
    /// OAuth scope requested from the token source
    pub scope: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl HubConfig {
    /// Settings for `project` with production defaults
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_ENDPOINT.to_string(),
            project: project.into(),
            location: DEFAULT_LOCATION.to_string(),
            user_agent: concat!("membershipctl/", env!("CARGO_PKG_VERSION")).to_string(),
            scope: CLOUD_PLATFORM_SCOPE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the API endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }
}

/// Client for the Hub membership API
///
/// Every request carries `alt=json` and a bearer token from the configured
/// [`TokenSource`]. Non-2xx responses become [`Error::Api`] with the status
/// and body.
#[derive(Clone)]
pub struct HubClient {
    http: reqwest::Client,
    config: HubConfig,
    tokens: Arc<dyn TokenSource>,
}

impl HubClient {
    /// Create a client from settings and a token source
    pub fn new(config: HubConfig, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        if config.project.is_empty() {
            return Err(Error::config("project must not be empty"));
        }
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    /// Settings this client was built with
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// `projects/{project}/locations/{location}`
    pub fn parent(&self) -> String {
        format!(
            "projects/{}/locations/{}",
            self.config.project, self.config.location
        )
    }

    /// Full resource name of a membership
    pub fn membership_name(&self, membership_id: &str) -> String {
        format!("{}/memberships/{}", self.parent(), membership_id)
    }

    /// Absolute URL for `path` under an API version
    pub(crate) fn url(&self, version: &str, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            version,
            path.trim_start_matches('/')
        )
    }

    /// Start an authenticated request with `alt=json` already set
    pub(crate) async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let token = self.tokens.token(&self.config.scope).await?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token)
            .query(&[("alt", "json")]))
    }

    /// Send a request and return status code and body text.
    ///
    /// Only transport failures are errors here; status handling is up to
    /// the caller.
    pub(crate) async fn send(&self, operation: &str, request: RequestBuilder) -> Result<(u16, String)> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::transport(operation, e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(operation, format!("reading body: {}", e)))?;
        debug!(operation = %operation, status, body = %body, "Hub response");
        Ok((status, body))
    }
}

/// Fail with [`Error::Api`] unless `status` is 2xx
pub(crate) fn ensure_success(operation: &str, status: u16, body: &str) -> Result<()> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(Error::api(operation, status, body))
    }
}

/// Decode a JSON body, failing with [`Error::Decode`]
pub(crate) fn decode<T: DeserializeOwned>(operation: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| Error::decode(operation, e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;

    fn client(base_url: &str) -> HubClient {
        let config = HubConfig::new("proj1").with_base_url(base_url);
        HubClient::new(config, Arc::new(StaticToken::new("t").unwrap())).unwrap()
    }

    #[test]
    fn membership_name_has_fixed_format() {
        let c = client(DEFAULT_ENDPOINT);
        assert_eq!(
            c.membership_name("cluster-a"),
            "projects/proj1/locations/global/memberships/cluster-a"
        );
    }

    #[test]
    fn url_joins_without_double_slashes() {
        let c = client("https://hub.example.com/");
        assert_eq!(
            c.url("v1", "/projects/proj1/locations/global/memberships/a"),
            "https://hub.example.com/v1/projects/proj1/locations/global/memberships/a"
        );
        let c = client("https://hub.example.com");
        assert_eq!(c.url("v1beta1", "x"), "https://hub.example.com/v1beta1/x");
    }

    #[test]
    fn empty_project_is_rejected() {
        let result = HubClient::new(
            HubConfig::new(""),
            Arc::new(StaticToken::new("t").unwrap()),
        );
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn non_2xx_is_an_api_error() {
        assert!(ensure_success("op", 204, "").is_ok());
        match ensure_success("op", 409, "conflict") {
            Err(Error::Api { status, body, .. }) => {
                assert_eq!(status, 409);
                assert_eq!(body, "conflict");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn location_override_changes_parent() {
        let c = HubClient::new(
            HubConfig::new("proj1").with_location("us-central1"),
            Arc::new(StaticToken::new("t").unwrap()),
        )
        .unwrap();
        assert_eq!(c.parent(), "projects/proj1/locations/us-central1");
    }
}
