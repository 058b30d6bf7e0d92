//! Hub wire types
//!
//! Field names follow the Hub's JSON (camelCase). Every field defaults so a
//! partially populated response still decodes; only the fields this crate
//! acts on are validated by callers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered cluster as tracked by the Hub
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    /// `projects/{project}/locations/{location}/memberships/{id}`; never changes
    #[serde(default)]
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Opaque cluster UUID supplied at creation
    #[serde(default, rename = "externalId")]
    pub external_id: String,
    /// Where the cluster's API server lives
    #[serde(default)]
    pub endpoint: MembershipEndpoint,
    /// Server-assigned lifecycle state
    #[serde(default)]
    pub state: MembershipState,
    /// Workload identity metadata
    #[serde(default)]
    pub authority: Authority,
    /// Creation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    /// Last update timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    /// Deletion timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_time: Option<DateTime<Utc>>,
    /// Most recent connect-agent connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connection_time: Option<DateTime<Utc>>,
}

impl Membership {
    /// Current state code
    pub fn state_code(&self) -> StateCode {
        self.state.code
    }
}

/// Cluster endpoint information
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipEndpoint {
    /// Present for GKE-hosted clusters
    #[serde(default)]
    pub gke_cluster: GkeCluster,
}

/// Link to the underlying cluster resource
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GkeCluster {
    /// Self-link of the cluster resource
    #[serde(default)]
    pub resource_link: String,
}

/// Membership state as reported by the Hub
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipState {
    /// State code
    #[serde(default)]
    pub code: StateCode,
}

/// Membership lifecycle state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateCode {
    /// The cluster is being registered
    Creating,
    /// The cluster is registered
    Ready,
    /// The cluster is being unregistered
    Deleting,
    /// The membership is being updated
    Updating,
    /// The membership is being updated by the Hub itself
    ServiceUpdating,
    /// Not set, or a code this client does not know
    #[default]
    #[serde(other)]
    Unspecified,
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateCode::Unspecified => "UNSPECIFIED",
            StateCode::Creating => "CREATING",
            StateCode::Ready => "READY",
            StateCode::Deleting => "DELETING",
            StateCode::Updating => "UPDATING",
            StateCode::ServiceUpdating => "SERVICE_UPDATING",
        };
        f.write_str(s)
    }
}

/// Workload identity metadata
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authority {
    /// OIDC issuer URI
    #[serde(default)]
    pub issuer: String,
    /// Identity namespace the issuer is recognized in
    #[serde(default)]
    pub identity_namespace: String,
    /// Identity provider reflecting the issuer
    #[serde(default)]
    pub identity_provider: String,
}

/// Long-running operation handle
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation name, e.g. `projects/p/locations/global/operations/op-1`
    #[serde(default)]
    pub name: String,
    /// Whether the operation has finished
    #[serde(default)]
    pub done: bool,
    /// Set when the operation finished unsuccessfully
    #[serde(default)]
    pub error: Option<RpcStatus>,
}

/// gRPC-style status (`google.rpc.Status`)
///
/// Code 0 means OK. Zero values are omitted on the wire, hence the defaults.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcStatus {
    /// Status code
    #[serde(default)]
    pub code: i32,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}

/// Exclusivity CRD and CR manifests, either of which may be empty
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusivityManifests {
    /// CustomResourceDefinition manifest
    #[serde(default)]
    pub crd_manifest: String,
    /// Custom resource manifest
    #[serde(default)]
    pub cr_manifest: String,
}

impl ExclusivityManifests {
    /// Whether the Hub produced nothing to apply
    pub fn is_empty(&self) -> bool {
        self.crd_manifest.is_empty() && self.cr_manifest.is_empty()
    }
}

/// One object of the connect-agent manifest set
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectAgentResource {
    /// Declared kind and apiVersion
    #[serde(default, rename = "type")]
    pub resource_type: ResourceType,
    /// Manifest text; empty for placeholder objects
    #[serde(default)]
    pub manifest: String,
}

/// Declared type of a connect-agent resource
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceType {
    /// Kubernetes kind
    #[serde(default)]
    pub kind: String,
    /// Kubernetes apiVersion
    #[serde(default)]
    pub api_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_membership() {
        let json = r#"{
            "name": "projects/proj1/locations/global/memberships/cluster-a",
            "description": "cluster-a",
            "externalId": "0b5c3bc4-1b5f-4a53-8e3c-5f3d0a2a7d11",
            "endpoint": {"gkeCluster": {"resourceLink": "//container.googleapis.com/projects/proj1/zones/us-west1-a/clusters/cluster-a"}},
            "state": {"code": "READY"},
            "authority": {"issuer": "https://container.googleapis.com/v1/projects/proj1/locations/us-west1-a/clusters/cluster-a", "identityNamespace": "proj1.svc.id.goog"},
            "createTime": "2020-05-20T10:00:00.123456Z",
            "updateTime": "2020-05-20T10:01:00Z"
        }"#;
        let m: Membership = serde_json::from_str(json).unwrap();
        assert_eq!(m.state_code(), StateCode::Ready);
        assert_eq!(m.external_id, "0b5c3bc4-1b5f-4a53-8e3c-5f3d0a2a7d11");
        assert!(m.endpoint.gke_cluster.resource_link.ends_with("clusters/cluster-a"));
        assert_eq!(m.authority.identity_namespace, "proj1.svc.id.goog");
        assert!(m.create_time.is_some());
        assert!(m.delete_time.is_none());
    }

    #[test]
    fn unknown_and_legacy_state_codes_map_to_unspecified() {
        let legacy: MembershipState = serde_json::from_str(r#"{"code":"CODE_UNSPECIFIED"}"#).unwrap();
        assert_eq!(legacy.code, StateCode::Unspecified);
        let future: MembershipState = serde_json::from_str(r#"{"code":"HIBERNATING"}"#).unwrap();
        assert_eq!(future.code, StateCode::Unspecified);
        let missing: MembershipState = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.code, StateCode::Unspecified);
    }

    #[test]
    fn state_code_display_matches_wire_format() {
        assert_eq!(StateCode::ServiceUpdating.to_string(), "SERVICE_UPDATING");
        let json = serde_json::to_string(&StateCode::Deleting).unwrap();
        assert_eq!(json, r#""DELETING""#);
    }

    #[test]
    fn operation_error_status_decodes() {
        let op: Operation = serde_json::from_str(
            r#"{"name":"operations/op-1","done":true,"error":{"code":9,"message":"precondition"}}"#,
        )
        .unwrap();
        assert!(op.done);
        assert_eq!(op.error.unwrap().code, 9);
    }

    #[test]
    fn connect_resource_decodes_type_field() {
        let r: ConnectAgentResource = serde_json::from_str(
            r#"{"type":{"kind":"Secret","apiVersion":"v1"},"manifest":""}"#,
        )
        .unwrap();
        assert_eq!(r.resource_type.kind, "Secret");
        assert!(r.manifest.is_empty());
    }
}
