//! The two systems a workflow drives, behind traits
//!
//! Production wires [`HubClient`] and [`Cluster`]; tests substitute mocks.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use membership_cluster::{cluster_uuid, Cluster, ObjectOutcome};
use membership_common::Result;
use membership_hub::{
    ConnectAgentOptions, ConnectAgentResource, ExclusivityManifests, HubClient, Lookup, Operation,
};

/// Hub operations used by the workflows
///
/// This trait allows mocking the Hub in tests while using the real REST
/// client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HubApi: Send + Sync {
    /// Full resource name for a membership id
    fn membership_name(&self, membership_id: &str) -> String;

    /// Look up a membership, see [`HubClient::get_membership`]
    async fn get_membership(&self, membership_id: &str, expect_absent: bool) -> Result<Lookup>;

    /// Start membership creation
    async fn create_membership(
        &self,
        membership_id: &str,
        description: &str,
        external_id: &str,
        resource_link: &str,
    ) -> Result<Operation>;

    /// Start membership deletion
    async fn delete_membership(&self, membership_id: &str) -> Result<Operation>;

    /// Poll a long-running operation once
    async fn check_operation(&self, operation_name: &str) -> Result<bool>;

    /// Dry-run exclusivity check of an existing CR
    async fn validate_exclusivity(&self, membership_id: &str, cr_manifest: &str) -> Result<()>;

    /// Canonical exclusivity manifests to install
    async fn generate_exclusivity(
        &self,
        membership_id: &str,
        cr_manifest: &str,
        crd_manifest: &str,
    ) -> Result<ExclusivityManifests>;

    /// Ordered connect-agent manifests
    async fn generate_connect_manifest(
        &self,
        membership_name: &str,
        options: &ConnectAgentOptions,
    ) -> Result<Vec<ConnectAgentResource>>;
}

#[async_trait]
impl HubApi for HubClient {
    fn membership_name(&self, membership_id: &str) -> String {
        HubClient::membership_name(self, membership_id)
    }

    async fn get_membership(&self, membership_id: &str, expect_absent: bool) -> Result<Lookup> {
        HubClient::get_membership(self, membership_id, expect_absent).await
    }

    async fn create_membership(
        &self,
        membership_id: &str,
        description: &str,
        external_id: &str,
        resource_link: &str,
    ) -> Result<Operation> {
        HubClient::create_membership(self, membership_id, description, external_id, resource_link)
            .await
    }

    async fn delete_membership(&self, membership_id: &str) -> Result<Operation> {
        HubClient::delete_membership(self, membership_id).await
    }

    async fn check_operation(&self, operation_name: &str) -> Result<bool> {
        HubClient::check_operation(self, operation_name).await
    }

    async fn validate_exclusivity(&self, membership_id: &str, cr_manifest: &str) -> Result<()> {
        HubClient::validate_exclusivity(self, membership_id, cr_manifest).await
    }

    async fn generate_exclusivity(
        &self,
        membership_id: &str,
        cr_manifest: &str,
        crd_manifest: &str,
    ) -> Result<ExclusivityManifests> {
        HubClient::generate_exclusivity(self, membership_id, cr_manifest, crd_manifest).await
    }

    async fn generate_connect_manifest(
        &self,
        membership_name: &str,
        options: &ConnectAgentOptions,
    ) -> Result<Vec<ConnectAgentResource>> {
        HubClient::generate_connect_manifest(self, membership_name, options).await
    }
}

/// Cluster operations used by the workflows
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterOps: Send + Sync {
    /// UID of the `kube-system` namespace
    async fn cluster_uuid(&self) -> Result<String>;

    /// Existing exclusivity CRD and CR, empty when absent
    async fn read_artifacts(&self) -> Result<ExclusivityManifests>;

    /// Install exclusivity manifests; empty ones are skipped
    async fn install_artifacts(&self, crd_manifest: &str, cr_manifest: &str) -> Result<()>;

    /// Remove exclusivity artifacts; absence is success
    async fn delete_artifacts(&self) -> Result<()>;

    /// Converge connect-agent manifests in order
    async fn reconcile_connect_agent(
        &self,
        resources: &[ConnectAgentResource],
        namespace: &str,
        service_account_key: Option<Vec<u8>>,
    ) -> Result<Vec<ObjectOutcome>>;
}

#[async_trait]
impl ClusterOps for Cluster {
    async fn cluster_uuid(&self) -> Result<String> {
        cluster_uuid(self.client()).await
    }

    async fn read_artifacts(&self) -> Result<ExclusivityManifests> {
        self.artifacts().read_existing().await
    }

    async fn install_artifacts(&self, crd_manifest: &str, cr_manifest: &str) -> Result<()> {
        self.artifacts().install(crd_manifest, cr_manifest).await
    }

    async fn delete_artifacts(&self) -> Result<()> {
        self.artifacts().delete_if_present().await
    }

    async fn reconcile_connect_agent(
        &self,
        resources: &[ConnectAgentResource],
        namespace: &str,
        service_account_key: Option<Vec<u8>>,
    ) -> Result<Vec<ObjectOutcome>> {
        self.reconciler(namespace, service_account_key)
            .reconcile(resources)
            .await
    }
}
