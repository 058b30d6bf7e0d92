//! Cluster side of Hub membership
//!
//! Everything that talks to the member cluster's API server: building a
//! client from a kubeconfig, reading the cluster UUID, managing the
//! exclusivity CRD/CR pair, and reconciling connect-agent manifests.

#![deny(missing_docs)]

pub mod artifacts;
pub mod client;
pub mod reconcile;

use kube::Client;

pub use artifacts::{ArtifactStore, KubeRawApi, RawApi};
pub use client::{cluster_uuid, create_client, KubeAuth};
pub use reconcile::{
    Action, KubeObjectApi, ManifestObject, ManifestReconciler, ObjectApi, ObjectKind,
    ObjectOutcome,
};

/// Live handle on one member cluster
#[derive(Clone)]
pub struct Cluster {
    client: Client,
}

impl Cluster {
    /// Connect using a kubeconfig path and context
    pub async fn connect(auth: &KubeAuth) -> membership_common::Result<Self> {
        Ok(Self::new(create_client(auth).await?))
    }

    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The underlying kube client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Exclusivity artifact store for this cluster
    pub fn artifacts(&self) -> ArtifactStore<KubeRawApi> {
        ArtifactStore::new(KubeRawApi::new(self.client.clone()))
    }

    /// Manifest reconciler installing into `namespace`
    pub fn reconciler(
        &self,
        namespace: &str,
        service_account_key: Option<Vec<u8>>,
    ) -> ManifestReconciler<KubeObjectApi> {
        ManifestReconciler::new(
            KubeObjectApi::new(self.client.clone()),
            namespace,
            service_account_key,
        )
    }
}
