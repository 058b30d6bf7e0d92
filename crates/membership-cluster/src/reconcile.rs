//! Connect-agent manifest reconciliation
//!
//! The Hub returns an ordered list of manifests. Each one is decoded into a
//! typed object and converged in list order; namespaces come before the
//! objects placed in them, so the order is never changed.
//!
//! Change detection relies on the `version` label the Hub stamps on every
//! object: a live object with the same label is left alone. Secrets carry no
//! such label and are always re-applied.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use membership_common::yaml::{manifest_header, parse_manifest};
use membership_common::{Error, Result, FIELD_MANAGER};
use membership_hub::ConnectAgentResource;

/// Label carrying the manifest version
pub const VERSION_LABEL: &str = "version";

/// Name of the synthesized service-account credential secret, also its data key
pub const CREDS_SECRET_NAME: &str = "creds-gcp";

/// Kinds the reconciler knows how to converge
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// core/v1 Namespace
    Namespace,
    /// core/v1 ServiceAccount
    ServiceAccount,
    /// rbac/v1 Role
    Role,
    /// rbac/v1 RoleBinding
    RoleBinding,
    /// rbac/v1 ClusterRole
    ClusterRole,
    /// rbac/v1 ClusterRoleBinding
    ClusterRoleBinding,
    /// core/v1 Service
    Service,
    /// apps/v1 Deployment
    Deployment,
    /// core/v1 Secret
    Secret,
}

/// How a kind is brought in line with its manifest
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Strategy {
    /// Create when absent, update when the version label differs
    VersionLabel,
    /// As `VersionLabel`, but an update rejected as invalid is retried as
    /// delete then create
    VersionLabelRecreateOnInvalid,
    /// Create when absent, otherwise always update. A freshly created object
    /// is not updated again in the same pass.
    AlwaysApply,
}

static KIND_TABLE: [(&str, ObjectKind, Strategy); 9] = [
    ("Namespace", ObjectKind::Namespace, Strategy::VersionLabel),
    ("ServiceAccount", ObjectKind::ServiceAccount, Strategy::VersionLabel),
    ("Role", ObjectKind::Role, Strategy::VersionLabel),
    ("RoleBinding", ObjectKind::RoleBinding, Strategy::VersionLabel),
    ("ClusterRole", ObjectKind::ClusterRole, Strategy::VersionLabel),
    ("ClusterRoleBinding", ObjectKind::ClusterRoleBinding, Strategy::VersionLabel),
    ("Service", ObjectKind::Service, Strategy::VersionLabelRecreateOnInvalid),
    ("Deployment", ObjectKind::Deployment, Strategy::VersionLabelRecreateOnInvalid),
    ("Secret", ObjectKind::Secret, Strategy::AlwaysApply),
];

impl ObjectKind {
    /// Look up a Kubernetes `kind`; `None` for kinds this reconciler skips
    pub fn from_kind(kind: &str) -> Option<Self> {
        KIND_TABLE
            .iter()
            .find(|(name, _, _)| *name == kind)
            .map(|(_, k, _)| *k)
    }

    /// The Kubernetes `kind` string
    pub fn as_str(self) -> &'static str {
        self.entry().0
    }

    fn strategy(self) -> Strategy {
        self.entry().2
    }

    fn entry(self) -> &'static (&'static str, ObjectKind, Strategy) {
        // every variant has exactly one row
        KIND_TABLE
            .iter()
            .find(|(_, k, _)| *k == self)
            .unwrap_or(&KIND_TABLE[0])
    }

    /// Whether objects of this kind live outside namespaces
    pub fn is_cluster_scoped(self) -> bool {
        matches!(
            self,
            ObjectKind::Namespace | ObjectKind::ClusterRole | ObjectKind::ClusterRoleBinding
        )
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded connect-agent object
#[derive(Clone, Debug, PartialEq)]
pub enum ManifestObject {
    /// Namespace
    Namespace(Namespace),
    /// ServiceAccount
    ServiceAccount(ServiceAccount),
    /// Role
    Role(Role),
    /// RoleBinding
    RoleBinding(RoleBinding),
    /// ClusterRole
    ClusterRole(ClusterRole),
    /// ClusterRoleBinding
    ClusterRoleBinding(ClusterRoleBinding),
    /// Service
    Service(Service),
    /// Deployment
    Deployment(Deployment),
    /// Secret
    Secret(Secret),
}

macro_rules! each_object {
    ($object:expr, $o:ident => $body:expr) => {
        match $object {
            ManifestObject::Namespace($o) => $body,
            ManifestObject::ServiceAccount($o) => $body,
            ManifestObject::Role($o) => $body,
            ManifestObject::RoleBinding($o) => $body,
            ManifestObject::ClusterRole($o) => $body,
            ManifestObject::ClusterRoleBinding($o) => $body,
            ManifestObject::Service($o) => $body,
            ManifestObject::Deployment($o) => $body,
            ManifestObject::Secret($o) => $body,
        }
    };
}

impl ManifestObject {
    /// Deserialize a parsed manifest as `kind`
    pub fn from_value(kind: ObjectKind, value: Value) -> Result<Self> {
        fn typed<T: DeserializeOwned>(kind: ObjectKind, value: Value) -> Result<T> {
            serde_json::from_value(value).map_err(|e| Error::decode(kind.as_str(), e.to_string()))
        }
        Ok(match kind {
            ObjectKind::Namespace => ManifestObject::Namespace(typed(kind, value)?),
            ObjectKind::ServiceAccount => ManifestObject::ServiceAccount(typed(kind, value)?),
            ObjectKind::Role => ManifestObject::Role(typed(kind, value)?),
            ObjectKind::RoleBinding => ManifestObject::RoleBinding(typed(kind, value)?),
            ObjectKind::ClusterRole => ManifestObject::ClusterRole(typed(kind, value)?),
            ObjectKind::ClusterRoleBinding => {
                ManifestObject::ClusterRoleBinding(typed(kind, value)?)
            }
            ObjectKind::Service => ManifestObject::Service(typed(kind, value)?),
            ObjectKind::Deployment => ManifestObject::Deployment(typed(kind, value)?),
            ObjectKind::Secret => ManifestObject::Secret(typed(kind, value)?),
        })
    }

    /// Kind of this object
    pub fn kind(&self) -> ObjectKind {
        match self {
            ManifestObject::Namespace(_) => ObjectKind::Namespace,
            ManifestObject::ServiceAccount(_) => ObjectKind::ServiceAccount,
            ManifestObject::Role(_) => ObjectKind::Role,
            ManifestObject::RoleBinding(_) => ObjectKind::RoleBinding,
            ManifestObject::ClusterRole(_) => ObjectKind::ClusterRole,
            ManifestObject::ClusterRoleBinding(_) => ObjectKind::ClusterRoleBinding,
            ManifestObject::Service(_) => ObjectKind::Service,
            ManifestObject::Deployment(_) => ObjectKind::Deployment,
            ManifestObject::Secret(_) => ObjectKind::Secret,
        }
    }

    /// Object metadata
    pub fn metadata(&self) -> &ObjectMeta {
        each_object!(self, o => &o.metadata)
    }

    /// Mutable object metadata
    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        each_object!(self, o => &mut o.metadata)
    }

    /// `metadata.name`, empty if unset
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Value of the version label, if any
    pub fn version(&self) -> Option<&str> {
        version_label(self.metadata())
    }

    fn describe(&self) -> String {
        match &self.metadata().namespace {
            Some(ns) => format!("{} {}/{}", self.kind(), ns, self.name()),
            None => format!("{} {}", self.kind(), self.name()),
        }
    }
}

fn version_label(meta: &ObjectMeta) -> Option<&str> {
    meta.labels
        .as_ref()
        .and_then(|labels| labels.get(VERSION_LABEL))
        .map(String::as_str)
}

/// Typed CRUD against the cluster, one object at a time
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectApi: Send + Sync {
    /// Metadata of the live object matching `object`'s kind, namespace and name
    async fn get(&self, object: &ManifestObject) -> Result<Option<ObjectMeta>>;

    /// Create `object`
    async fn create(&self, object: &ManifestObject) -> Result<()>;

    /// Replace the live object with `object`
    async fn update(&self, object: &ManifestObject) -> Result<()>;

    /// Delete the live object; absence is not an error
    async fn delete(&self, object: &ManifestObject) -> Result<()>;
}

/// [`ObjectApi`] backed by a kube client
pub struct KubeObjectApi {
    client: Client,
}

impl KubeObjectApi {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn namespace_of(meta: &ObjectMeta) -> Result<&str> {
    meta.namespace
        .as_deref()
        .ok_or_else(|| Error::decode("manifest", "namespaced object has no namespace"))
}

/// Bind `$api` to the right `Api<K>` for the object's variant and evaluate `$body`
macro_rules! with_api {
    ($client:expr, $object:expr, |$api:ident, $o:ident| $body:expr) => {
        match $object {
            ManifestObject::Namespace($o) => {
                let $api: Api<Namespace> = Api::all($client);
                $body
            }
            ManifestObject::ClusterRole($o) => {
                let $api: Api<ClusterRole> = Api::all($client);
                $body
            }
            ManifestObject::ClusterRoleBinding($o) => {
                let $api: Api<ClusterRoleBinding> = Api::all($client);
                $body
            }
            ManifestObject::ServiceAccount($o) => {
                let $api: Api<ServiceAccount> = Api::namespaced($client, namespace_of(&$o.metadata)?);
                $body
            }
            ManifestObject::Role($o) => {
                let $api: Api<Role> = Api::namespaced($client, namespace_of(&$o.metadata)?);
                $body
            }
            ManifestObject::RoleBinding($o) => {
                let $api: Api<RoleBinding> = Api::namespaced($client, namespace_of(&$o.metadata)?);
                $body
            }
            ManifestObject::Service($o) => {
                let $api: Api<Service> = Api::namespaced($client, namespace_of(&$o.metadata)?);
                $body
            }
            ManifestObject::Deployment($o) => {
                let $api: Api<Deployment> = Api::namespaced($client, namespace_of(&$o.metadata)?);
                $body
            }
            ManifestObject::Secret($o) => {
                let $api: Api<Secret> = Api::namespaced($client, namespace_of(&$o.metadata)?);
                $body
            }
        }
    };
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

async fn get_meta<K>(api: &Api<K>, name: &str) -> Result<Option<ObjectMeta>>
where
    K: Resource + Clone + DeserializeOwned + fmt::Debug,
{
    Ok(api.get_opt(name).await?.map(|o| o.meta().clone()))
}

async fn create_object<K>(api: &Api<K>, object: &K) -> Result<()>
where
    K: Resource + Clone + Serialize + DeserializeOwned + fmt::Debug,
{
    api.create(&post_params(), object).await?;
    Ok(())
}

async fn replace_object<K>(api: &Api<K>, name: &str, object: &K) -> Result<()>
where
    K: Resource + Clone + Serialize + DeserializeOwned + fmt::Debug,
{
    api.replace(name, &post_params(), object).await?;
    Ok(())
}

async fn delete_object<K>(api: &Api<K>, name: &str) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + fmt::Debug,
{
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ObjectApi for KubeObjectApi {
    async fn get(&self, object: &ManifestObject) -> Result<Option<ObjectMeta>> {
        let name = object.name();
        with_api!(self.client.clone(), object, |api, _o| get_meta(&api, name).await)
    }

    async fn create(&self, object: &ManifestObject) -> Result<()> {
        with_api!(self.client.clone(), object, |api, o| create_object(&api, o).await)
    }

    async fn update(&self, object: &ManifestObject) -> Result<()> {
        let name = object.name();
        with_api!(self.client.clone(), object, |api, o| replace_object(&api, name, o).await)
    }

    async fn delete(&self, object: &ManifestObject) -> Result<()> {
        let name = object.name();
        with_api!(self.client.clone(), object, |api, _o| delete_object(&api, name).await)
    }
}

/// What happened to one object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// The object did not exist and was created
    Created,
    /// The live object was replaced
    Updated,
    /// An invalid update was recovered by deleting and recreating
    Recreated,
    /// The live object already carried the incoming version
    Unchanged,
    /// The kind is not handled
    Skipped,
}

/// Outcome of reconciling one manifest
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectOutcome {
    /// `kind namespace/name` of the object, or the declared kind when skipped
    pub object: String,
    /// Action taken
    pub action: Action,
}

/// Converges connect-agent manifests into the cluster
pub struct ManifestReconciler<A> {
    api: A,
    namespace: String,
    service_account_key: Option<Vec<u8>>,
}

impl<A: ObjectApi> ManifestReconciler<A> {
    /// Reconciler for an agent installed into `namespace`.
    ///
    /// `service_account_key` populates the placeholder credential secret.
    pub fn new(api: A, namespace: impl Into<String>, service_account_key: Option<Vec<u8>>) -> Self {
        Self {
            api,
            namespace: namespace.into(),
            service_account_key,
        }
    }

    /// Apply `resources` strictly in order, stopping at the first failure
    pub async fn reconcile(&self, resources: &[ConnectAgentResource]) -> Result<Vec<ObjectOutcome>> {
        let mut outcomes = Vec::with_capacity(resources.len());
        for (index, resource) in resources.iter().enumerate() {
            let outcome = match self.decode(index, resource)? {
                Some(object) => {
                    let label = object.describe();
                    let action = self
                        .apply(&object)
                        .await
                        .map_err(|e| Error::in_step(format!("reconciling {}", label), e))?;
                    info!(object = %label, action = ?action, "reconciled");
                    ObjectOutcome {
                        object: label,
                        action,
                    }
                }
                None => ObjectOutcome {
                    object: resource.resource_type.kind.clone(),
                    action: Action::Skipped,
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Decode one resource; `None` for kinds outside the handled set
    fn decode(&self, index: usize, resource: &ConnectAgentResource) -> Result<Option<ManifestObject>> {
        let context = format!("manifest {} ({})", index, resource.resource_type.kind);
        let is_secret = resource.resource_type.kind == ObjectKind::Secret.as_str();

        // Syntax errors always fail; only a well-formed placeholder without
        // identity fields stands in for the credential secret.
        let value = parse_manifest(&resource.manifest, &context)?;
        let header = match manifest_header(&value, &context) {
            Ok(header) => header,
            Err(_) if is_secret => {
                debug!(index, "placeholder secret, synthesizing credentials");
                return self.creds_secret().map(Some);
            }
            Err(e) => return Err(e),
        };

        let Some(kind) = ObjectKind::from_kind(&header.kind) else {
            warn!(index, kind = %header.kind, name = %header.name, "skipping unhandled kind");
            return Ok(None);
        };
        let mut object = ManifestObject::from_value(kind, value)?;
        self.place(&mut object);
        Ok(Some(object))
    }

    /// Secrets always go to the agent namespace; other namespaced objects
    /// default to it
    fn place(&self, object: &mut ManifestObject) {
        let kind = object.kind();
        if kind.is_cluster_scoped() {
            return;
        }
        let meta = object.metadata_mut();
        if kind == ObjectKind::Secret || meta.namespace.as_deref().unwrap_or_default().is_empty() {
            meta.namespace = Some(self.namespace.clone());
        }
    }

    fn creds_secret(&self) -> Result<ManifestObject> {
        let key = self.service_account_key.as_ref().ok_or_else(|| {
            Error::config("connect agent needs a service account key for its credential secret")
        })?;
        Ok(ManifestObject::Secret(Secret {
            metadata: ObjectMeta {
                name: Some(CREDS_SECRET_NAME.to_string()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                CREDS_SECRET_NAME.to_string(),
                ByteString(key.clone()),
            )])),
            ..Default::default()
        }))
    }

    async fn apply(&self, object: &ManifestObject) -> Result<Action> {
        let Some(live) = self.api.get(object).await? else {
            self.api.create(object).await?;
            return Ok(Action::Created);
        };

        let strategy = object.kind().strategy();
        if strategy != Strategy::AlwaysApply && version_label(&live) == object.version() {
            debug!(object = %object.describe(), version = ?object.version(), "version unchanged");
            return Ok(Action::Unchanged);
        }

        let mut desired = object.clone();
        desired.metadata_mut().resource_version = live.resource_version.clone();
        match self.api.update(&desired).await {
            Ok(()) => Ok(Action::Updated),
            Err(e) if strategy == Strategy::VersionLabelRecreateOnInvalid && is_invalid(&e) => {
                warn!(object = %object.describe(), error = %e, "update rejected as invalid, recreating");
                self.api.delete(object).await?;
                self.api.create(object).await?;
                Ok(Action::Recreated)
            }
            Err(e) => Err(e),
        }
    }
}

/// Whether the API server rejected a write as structurally invalid (422)
fn is_invalid(err: &Error) -> bool {
    matches!(
        err.root(),
        Error::Kube { source: kube::Error::Api(ae) } if ae.code == 422
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use membership_hub::types::ResourceType;
    use mockall::Sequence;

    fn resource(kind: &str, manifest: &str) -> ConnectAgentResource {
        ConnectAgentResource {
            resource_type: ResourceType {
                kind: kind.to_string(),
                api_version: "v1".to_string(),
            },
            manifest: manifest.to_string(),
        }
    }

    fn namespace_manifest(version: &str) -> String {
        format!(
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: gke-connect\n  labels:\n    version: \"{}\"\n",
            version
        )
    }

    fn live_meta(version: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some("live".to_string()),
            resource_version: Some("42".to_string()),
            labels: Some(BTreeMap::from([(VERSION_LABEL.to_string(), version.to_string())])),
            ..Default::default()
        }
    }

    fn reconciler(api: MockObjectApi) -> ManifestReconciler<MockObjectApi> {
        ManifestReconciler::new(api, "gke-connect", Some(b"{\"type\":\"service_account\"}".to_vec()))
    }

    fn kube_error(code: u16, reason: &str) -> Error {
        Error::from(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: reason.to_string(),
            reason: reason.to_string(),
            code,
        }))
    }

    const DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: gke-connect-agent
  namespace: gke-connect
  labels:
    version: "v2"
spec:
  selector:
    matchLabels:
      app: gke-connect-agent
  template:
    metadata:
      labels:
        app: gke-connect-agent
    spec:
      containers:
        - name: agent
          image: gcr.io/gkeconnect/gkeconnect-gce:release
"#;

    #[test]
    fn kind_table_covers_every_handled_kind() {
        for (name, kind, _) in KIND_TABLE {
            assert_eq!(ObjectKind::from_kind(name), Some(kind));
            assert_eq!(kind.as_str(), name);
        }
        assert_eq!(ObjectKind::from_kind("ConfigMap"), None);
        assert_eq!(ObjectKind::from_kind("namespace"), None);
    }

    #[tokio::test]
    async fn absent_object_is_created_once() {
        let mut api = MockObjectApi::new();
        api.expect_get().times(1).returning(|_| Ok(None));
        api.expect_create().times(1).returning(|_| Ok(()));
        api.expect_update().times(0);

        let outcomes = reconciler(api)
            .reconcile(&[resource("Namespace", &namespace_manifest("v1"))])
            .await
            .unwrap();
        assert_eq!(outcomes[0].action, Action::Created);
    }

    #[tokio::test]
    async fn matching_version_issues_no_update() {
        let mut api = MockObjectApi::new();
        api.expect_get().returning(|_| Ok(Some(live_meta("v1"))));
        api.expect_create().times(0);
        api.expect_update().times(0);

        let outcomes = reconciler(api)
            .reconcile(&[resource("Namespace", &namespace_manifest("v1"))])
            .await
            .unwrap();
        assert_eq!(outcomes[0].action, Action::Unchanged);
    }

    #[tokio::test]
    async fn different_version_issues_exactly_one_update() {
        let mut api = MockObjectApi::new();
        api.expect_get().returning(|_| Ok(Some(live_meta("v1"))));
        api.expect_create().times(0);
        api.expect_update()
            .times(1)
            .withf(|o| {
                o.version() == Some("v2") && o.metadata().resource_version.as_deref() == Some("42")
            })
            .returning(|_| Ok(()));

        let outcomes = reconciler(api)
            .reconcile(&[resource("Namespace", &namespace_manifest("v2"))])
            .await
            .unwrap();
        assert_eq!(outcomes[0].action, Action::Updated);
    }

    #[tokio::test]
    async fn existing_secret_is_updated_regardless_of_labels() {
        let manifest = "apiVersion: v1\nkind: Secret\nmetadata:\n  name: pull\n  labels:\n    version: \"v1\"\n";
        let mut api = MockObjectApi::new();
        api.expect_get().returning(|_| Ok(Some(live_meta("v1"))));
        api.expect_create().times(0);
        api.expect_update()
            .times(1)
            .withf(|o| o.metadata().namespace.as_deref() == Some("gke-connect"))
            .returning(|_| Ok(()));

        let outcomes = reconciler(api)
            .reconcile(&[resource("Secret", manifest)])
            .await
            .unwrap();
        assert_eq!(outcomes[0].action, Action::Updated);
    }

    #[tokio::test]
    async fn invalid_deployment_update_is_recreated() {
        let mut api = MockObjectApi::new();
        let mut seq = Sequence::new();
        api.expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(live_meta("v1"))));
        api.expect_update()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(kube_error(422, "Invalid")));
        api.expect_delete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        api.expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|o| o.kind() == ObjectKind::Deployment && o.metadata().resource_version.is_none())
            .returning(|_| Ok(()));

        let outcomes = reconciler(api)
            .reconcile(&[resource("Deployment", DEPLOYMENT)])
            .await
            .unwrap();
        assert_eq!(outcomes[0].action, Action::Recreated);
    }

    #[tokio::test]
    async fn invalid_update_of_other_kinds_is_fatal() {
        let mut api = MockObjectApi::new();
        api.expect_get().returning(|_| Ok(Some(live_meta("v1"))));
        api.expect_update()
            .times(1)
            .returning(|_| Err(kube_error(422, "Invalid")));
        api.expect_delete().times(0);
        api.expect_create().times(0);

        let err = reconciler(api)
            .reconcile(&[resource("Namespace", &namespace_manifest("v2"))])
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("reconciling Namespace gke-connect: "));
    }

    #[tokio::test]
    async fn other_update_failures_are_not_recovered() {
        let mut api = MockObjectApi::new();
        api.expect_get().returning(|_| Ok(Some(live_meta("v1"))));
        api.expect_update()
            .times(1)
            .returning(|_| Err(kube_error(409, "Conflict")));
        api.expect_delete().times(0);

        let result = reconciler(api)
            .reconcile(&[resource("Deployment", DEPLOYMENT)])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unknown_kinds_are_skipped() {
        let manifest = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: agent-config\n";
        let mut api = MockObjectApi::new();
        api.expect_get().times(0);

        let outcomes = reconciler(api)
            .reconcile(&[resource("ConfigMap", manifest)])
            .await
            .unwrap();
        assert_eq!(outcomes[0].action, Action::Skipped);
    }

    #[tokio::test]
    async fn undecodable_non_secret_fails() {
        let api = MockObjectApi::new();
        let err = reconciler(api)
            .reconcile(&[resource("Deployment", "")])
            .await
            .unwrap_err();
        assert!(matches!(err.root(), Error::Decode { .. }));
    }

    #[tokio::test]
    async fn malformed_secret_manifest_is_not_replaced() {
        let manifest = "apiVersion: v1\nkind: Secret\nmetadata: {name: pull-secret, labels: [unclosed\n";
        let mut api = MockObjectApi::new();
        api.expect_get().times(0);
        api.expect_create().times(0);

        let err = reconciler(api)
            .reconcile(&[resource("Secret", manifest)])
            .await
            .unwrap_err();
        assert!(matches!(err.root(), Error::Decode { .. }));
    }

    #[tokio::test]
    async fn empty_object_secret_is_a_placeholder() {
        let mut api = MockObjectApi::new();
        api.expect_get().times(1).returning(|_| Ok(None));
        api.expect_create()
            .times(1)
            .withf(|o| o.name() == CREDS_SECRET_NAME)
            .returning(|_| Ok(()));

        let outcomes = reconciler(api)
            .reconcile(&[resource("Secret", "{}")])
            .await
            .unwrap();
        assert_eq!(outcomes[0].object, "Secret gke-connect/creds-gcp");
    }

    #[tokio::test]
    async fn placeholder_secret_without_key_is_a_config_error() {
        let api = MockObjectApi::new();
        let err = ManifestReconciler::new(api, "gke-connect", None)
            .reconcile(&[resource("Secret", "")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn namespaced_objects_default_to_agent_namespace() {
        let manifest = "apiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: connect-agent-sa\n";
        let mut api = MockObjectApi::new();
        api.expect_get().returning(|_| Ok(None));
        api.expect_create()
            .times(1)
            .withf(|o| o.metadata().namespace.as_deref() == Some("gke-connect"))
            .returning(|_| Ok(()));

        reconciler(api)
            .reconcile(&[resource("ServiceAccount", manifest)])
            .await
            .unwrap();
    }

    fn is_creds_secret(o: &ManifestObject) -> bool {
        match o {
            ManifestObject::Secret(s) => {
                s.metadata.name.as_deref() == Some(CREDS_SECRET_NAME)
                    && s.metadata.namespace.as_deref() == Some("gke-connect")
                    && s.data.as_ref().and_then(|d| d.get(CREDS_SECRET_NAME))
                        == Some(&ByteString(b"{\"type\":\"service_account\"}".to_vec()))
            }
            _ => false,
        }
    }

    /// Story: first install creates the namespace and the synthesized
    /// credential secret, in manifest order
    #[tokio::test]
    async fn story_first_install_creates_namespace_then_secret() {
        let mut api = MockObjectApi::new();
        let mut seq = Sequence::new();
        api.expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|o| o.kind() == ObjectKind::Namespace)
            .returning(|_| Ok(None));
        api.expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|o| o.kind() == ObjectKind::Namespace && o.version() == Some("3"))
            .returning(|_| Ok(()));
        api.expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .withf(is_creds_secret)
            .returning(|_| Ok(None));
        api.expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .withf(is_creds_secret)
            .returning(|_| Ok(()));
        api.expect_update().times(0);

        let outcomes = reconciler(api)
            .reconcile(&[
                resource("Namespace", &namespace_manifest("3")),
                resource("Secret", ""),
            ])
            .await
            .unwrap();
        let actions: Vec<_> = outcomes.iter().map(|o| o.action).collect();
        assert_eq!(actions, vec![Action::Created, Action::Created]);
    }

    /// Story: re-running the same install leaves the namespace alone but
    /// re-applies the secret
    #[tokio::test]
    async fn story_rerun_updates_only_the_secret() {
        let mut api = MockObjectApi::new();
        api.expect_get()
            .withf(|o| o.kind() == ObjectKind::Namespace)
            .returning(|_| Ok(Some(live_meta("3"))));
        api.expect_get()
            .withf(is_creds_secret)
            .returning(|_| Ok(Some(live_meta(""))));
        api.expect_create().times(0);
        api.expect_update()
            .times(1)
            .withf(is_creds_secret)
            .returning(|_| Ok(()));

        let outcomes = reconciler(api)
            .reconcile(&[
                resource("Namespace", &namespace_manifest("3")),
                resource("Secret", ""),
            ])
            .await
            .unwrap();
        let actions: Vec<_> = outcomes.iter().map(|o| o.action).collect();
        assert_eq!(actions, vec![Action::Unchanged, Action::Updated]);
    }
}
