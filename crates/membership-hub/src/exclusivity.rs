//! Exclusivity negotiation
//!
//! A cluster may belong to one Hub at a time. Ownership is recorded in the
//! cluster as a CRD plus a single CR; the Hub validates an existing CR before
//! registration and hands back the canonical pair to install afterwards.

use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, warn};

use membership_common::{Error, Result};

use crate::client::{decode, ensure_success, HubClient};
use crate::types::{ExclusivityManifests, RpcStatus};
use crate::API_V1BETA1;

#[derive(Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    status: RpcStatus,
}

impl HubClient {
    /// Dry-run check that `cr_manifest` can be taken over by `membership_id`.
    ///
    /// Any nonzero status code is an [`Error::ExclusivityConflict`] carrying
    /// the Hub's message verbatim. Codes are not interpreted further.
    pub async fn validate_exclusivity(&self, membership_id: &str, cr_manifest: &str) -> Result<()> {
        let url = self.url(
            API_V1BETA1,
            &format!("{}/memberships:validateExclusivity", self.parent()),
        );
        let request = self.request(Method::GET, &url).await?.query(&[
            ("crManifest", cr_manifest),
            ("intendedMembership", membership_id),
        ]);
        let (status, body) = self.send("validate exclusivity", request).await?;
        ensure_success("validate exclusivity", status, &body)?;

        let response: ValidateResponse = decode("validate exclusivity", &body)?;
        if response.status.code != 0 {
            debug!(
                membership = %membership_id,
                code = response.status.code,
                "exclusivity validation rejected"
            );
            return Err(Error::exclusivity_conflict(response.status.message));
        }
        Ok(())
    }

    /// Ask the Hub for the CRD and CR manifests to install.
    ///
    /// Both may come back empty when the Hub has nothing new to produce;
    /// that is logged, not treated as a failure.
    pub async fn generate_exclusivity(
        &self,
        membership_id: &str,
        cr_manifest: &str,
        crd_manifest: &str,
    ) -> Result<ExclusivityManifests> {
        let name = self.membership_name(membership_id);
        let url = self.url(API_V1BETA1, &format!("{}:generateExclusivityManifest", name));
        let request = self.request(Method::GET, &url).await?.query(&[
            ("name", name.as_str()),
            ("crManifest", cr_manifest),
            ("crdManifest", crd_manifest),
        ]);
        let (status, body) = self.send("generate exclusivity manifest", request).await?;
        ensure_success("generate exclusivity manifest", status, &body)?;

        let manifests: ExclusivityManifests = decode("generate exclusivity manifest", &body)?;
        if manifests.is_empty() {
            warn!(membership = %membership_id, "Hub returned empty exclusivity manifests");
        }
        Ok(manifests)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::client::test_support::client_for;

    const VALIDATE_PATH: &str =
        "/v1beta1/projects/proj1/locations/global/memberships:validateExclusivity";
    const GENERATE_PATH: &str =
        "/v1beta1/projects/proj1/locations/global/memberships/cluster-a:generateExclusivityManifest";

    async fn serve_validate(body: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VALIDATE_PATH))
            .and(query_param("intendedMembership", "cluster-a"))
            .and(query_param("crManifest", "kind: Membership"))
            .and(query_param("alt", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn zero_status_code_validates() {
        let server = serve_validate(json!({"status": {"code": 0}})).await;
        client_for(&server.uri())
            .validate_exclusivity("cluster-a", "kind: Membership")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn omitted_status_code_counts_as_ok() {
        let server = serve_validate(json!({"status": {}})).await;
        client_for(&server.uri())
            .validate_exclusivity("cluster-a", "kind: Membership")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn nonzero_status_is_a_conflict_with_verbatim_message() {
        for code in [6, 9, 1] {
            let server =
                serve_validate(json!({"status": {"code": code, "message": "owned by hub proj0"}}))
                    .await;
            let err = client_for(&server.uri())
                .validate_exclusivity("cluster-a", "kind: Membership")
                .await
                .unwrap_err();
            match err {
                Error::ExclusivityConflict { message } => assert_eq!(message, "owned by hub proj0"),
                other => panic!("expected ExclusivityConflict, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn validate_non_2xx_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VALIDATE_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let err = client_for(&server.uri())
            .validate_exclusivity("cluster-a", "kind: Membership")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn generate_returns_manifest_pair() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(GENERATE_PATH))
            .and(query_param("crManifest", ""))
            .and(query_param("crdManifest", ""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "crdManifest": "kind: CustomResourceDefinition",
                "crManifest": "kind: Membership"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let manifests = client_for(&server.uri())
            .generate_exclusivity("cluster-a", "", "")
            .await
            .unwrap();
        assert_eq!(manifests.crd_manifest, "kind: CustomResourceDefinition");
        assert_eq!(manifests.cr_manifest, "kind: Membership");
    }

    #[tokio::test]
    async fn both_manifests_empty_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let manifests = client_for(&server.uri())
            .generate_exclusivity("cluster-a", "", "")
            .await
            .unwrap();
        assert!(manifests.is_empty());
    }

    #[tokio::test]
    async fn malformed_generate_response_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server.uri())
            .generate_exclusivity("cluster-a", "", "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }
}
