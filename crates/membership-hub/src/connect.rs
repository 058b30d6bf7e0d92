//! Connect-agent manifest generation

use base64::Engine;
use reqwest::Method;
use serde::Deserialize;
use tracing::info;

use membership_common::{Result, DEFAULT_AGENT_NAMESPACE};

use crate::client::{decode, ensure_success, HubClient};
use crate::types::ConnectAgentResource;
use crate::API_V1BETA1;

/// Knobs for the generated connect-agent manifests
///
/// Only fields that differ from their defaults are sent; an omitted
/// parameter means "use the server default".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectAgentOptions {
    /// HTTP(S) proxy URL for outbound agent traffic
    pub proxy: String,
    /// Namespace the agent runs in
    pub namespace: String,
    /// Agent image version
    pub version: String,
    /// Leave out one-time installation resources such as secrets
    pub is_upgrade: bool,
    /// Alternate image registry
    pub registry: String,
    /// Image pull secret payload, sent base64-encoded
    pub image_pull_secret_content: Vec<u8>,
}

impl Default for ConnectAgentOptions {
    fn default() -> Self {
        Self {
            proxy: String::new(),
            namespace: DEFAULT_AGENT_NAMESPACE.to_string(),
            version: String::new(),
            is_upgrade: false,
            registry: String::new(),
            image_pull_secret_content: Vec::new(),
        }
    }
}

impl ConnectAgentOptions {
    /// Request parameters for the non-default fields
    fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if !self.proxy.is_empty() {
            params.push(("connectAgent.proxy", self.proxy.clone()));
        }
        if !self.namespace.is_empty() && self.namespace != DEFAULT_AGENT_NAMESPACE {
            params.push(("connectAgent.namespace", self.namespace.clone()));
        }
        if !self.version.is_empty() {
            params.push(("version", self.version.clone()));
        }
        if self.is_upgrade {
            params.push(("isUpgrade", "true".to_string()));
        }
        if !self.registry.is_empty() {
            params.push(("registry", self.registry.clone()));
        }
        if !self.image_pull_secret_content.is_empty() {
            let encoded =
                base64::engine::general_purpose::STANDARD.encode(&self.image_pull_secret_content);
            params.push(("imagePullSecretContent", encoded));
        }
        params
    }
}

#[derive(Deserialize)]
struct ConnectManifestResponse {
    #[serde(default)]
    manifest: Vec<ConnectAgentResource>,
}

impl HubClient {
    /// Fetch the ordered connect-agent manifest set for a membership.
    ///
    /// `membership_name` is the full resource name, sent as the path and as
    /// the `name` parameter. The returned order is the order objects must be
    /// applied in.
    pub async fn generate_connect_manifest(
        &self,
        membership_name: &str,
        options: &ConnectAgentOptions,
    ) -> Result<Vec<ConnectAgentResource>> {
        let url = self.url(API_V1BETA1, &format!("{}:generateConnectManifest", membership_name));
        let request = self
            .request(Method::GET, &url)
            .await?
            .query(&[("name", membership_name)])
            .query(&options.query_params());
        let (status, body) = self.send("generate connect manifest", request).await?;
        ensure_success("generate connect manifest", status, &body)?;

        let response: ConnectManifestResponse = decode("generate connect manifest", &body)?;
        info!(
            membership = %membership_name,
            objects = response.manifest.len(),
            "connect-agent manifests generated"
        );
        Ok(response.manifest)
    }
}
