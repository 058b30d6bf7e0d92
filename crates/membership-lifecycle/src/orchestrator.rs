//! Membership lifecycle workflows
//!
//! Each workflow runs its steps strictly in sequence and aborts on the first
//! fatal error, leaving whatever the last successful step produced. Nothing
//! is rolled back. The only waiting happens inside [`wait_until_done`]; every
//! network call is raced against the caller's cancellation token.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use membership_cluster::ObjectOutcome;
use membership_common::{
    wait_until_done, with_cancel, Error, Result, ResultExt, RetryPolicy, DEFAULT_AGENT_NAMESPACE,
};
use membership_hub::{ConnectAgentOptions, Lookup, Membership, StateCode};

use crate::clients::{ClusterOps, HubApi};

/// Inputs for registering a cluster
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterRequest {
    /// Membership id, e.g. `cluster-a`
    pub membership_id: String,
    /// Free-form description; the membership id when empty
    pub description: String,
    /// Self-link of the underlying cluster resource, if any
    pub resource_link: String,
}

/// A completed registration
#[derive(Clone, Debug, PartialEq)]
pub struct Registration {
    /// The membership as confirmed READY
    pub membership: Membership,
    /// UUID the membership was registered with
    pub cluster_uuid: String,
}

/// Inputs for unregistering a cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnregisterRequest {
    /// Membership id
    pub membership_id: String,
    /// Remove the exclusivity CRD and CR from the cluster afterwards
    pub delete_artifacts: bool,
}

/// Inputs for installing or upgrading the connect agent
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectAgentRequest {
    /// Membership id
    pub membership_id: String,
    /// Manifest generation options
    pub options: ConnectAgentOptions,
    /// Service-account key for the agent's credential secret
    pub service_account_key: Option<Vec<u8>>,
}

/// Drives the Hub and the cluster through membership workflows
pub struct Orchestrator<H, C> {
    hub: H,
    cluster: C,
    policy: RetryPolicy,
}

impl<H: HubApi, C: ClusterOps> Orchestrator<H, C> {
    /// Create an orchestrator polling with `policy`
    pub fn new(hub: H, cluster: C, policy: RetryPolicy) -> Self {
        Self {
            hub,
            cluster,
            policy,
        }
    }

    /// Register the cluster as a new membership.
    ///
    /// Reads the cluster UUID and existing exclusivity artifacts, confirms
    /// the membership is absent, validates any existing CR, creates the
    /// membership and waits for it, confirms READY, then installs the
    /// exclusivity artifacts the Hub generates.
    #[instrument(skip_all, fields(membership = %request.membership_id))]
    pub async fn register(
        &self,
        request: &RegisterRequest,
        cancel: &CancellationToken,
    ) -> Result<Registration> {
        let id = request.membership_id.as_str();
        info!("registering cluster");

        let uuid = with_cancel(cancel, "read cluster UUID", self.cluster.cluster_uuid())
            .await
            .step("reading cluster UUID")?;
        let existing = with_cancel(cancel, "read artifacts", self.cluster.read_artifacts())
            .await
            .step("reading exclusivity artifacts")?;
        debug!(cluster_uuid = %uuid, has_cr = !existing.cr_manifest.is_empty(), "cluster state read");

        with_cancel(cancel, "get membership", self.hub.get_membership(id, true))
            .await
            .step("checking membership is absent")?;

        if existing.cr_manifest.is_empty() {
            debug!("no existing membership CR, skipping exclusivity validation");
        } else {
            with_cancel(
                cancel,
                "validate exclusivity",
                self.hub.validate_exclusivity(id, &existing.cr_manifest),
            )
            .await
            .step("validating exclusivity")?;
        }

        let description = if request.description.is_empty() {
            id
        } else {
            request.description.as_str()
        };
        let operation = with_cancel(
            cancel,
            "create membership",
            self.hub
                .create_membership(id, description, &uuid, &request.resource_link),
        )
        .await
        .step("creating membership")?;

        wait_until_done(&self.policy, "membership creation", cancel, || {
            self.hub.check_operation(&operation.name)
        })
        .await
        .step("waiting for membership creation")?;

        let membership = self
            .require_ready(id, cancel)
            .await
            .step("confirming membership")?;

        let manifests = with_cancel(
            cancel,
            "generate exclusivity manifests",
            self.hub
                .generate_exclusivity(id, &existing.cr_manifest, &existing.crd_manifest),
        )
        .await
        .step("generating exclusivity manifests")?;
        with_cancel(
            cancel,
            "install artifacts",
            self.cluster
                .install_artifacts(&manifests.crd_manifest, &manifests.cr_manifest),
        )
        .await
        .step("installing exclusivity artifacts")?;

        info!(name = %membership.name, "cluster registered");
        Ok(Registration {
            membership,
            cluster_uuid: uuid,
        })
    }

    /// Unregister a membership.
    ///
    /// Returns once the Hub reports the membership as DELETING or gone,
    /// without waiting for full removal.
    #[instrument(skip_all, fields(membership = %request.membership_id))]
    pub async fn unregister(
        &self,
        request: &UnregisterRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let id = request.membership_id.as_str();
        info!("unregistering cluster");

        with_cancel(cancel, "get membership", self.hub.get_membership(id, false))
            .await
            .step("confirming membership exists")?;
        let operation = with_cancel(cancel, "delete membership", self.hub.delete_membership(id))
            .await
            .step("deleting membership")?;
        debug!(operation = %operation.name, "deletion started");

        wait_until_done(&self.policy, "membership deletion", cancel, || {
            self.deletion_observed(id)
        })
        .await
        .step("waiting for membership deletion")?;

        if request.delete_artifacts {
            with_cancel(cancel, "delete artifacts", self.cluster.delete_artifacts())
                .await
                .step("deleting exclusivity artifacts")?;
        }

        info!("cluster unregistered");
        Ok(())
    }

    /// Install or upgrade the connect agent for a READY membership
    #[instrument(skip_all, fields(membership = %request.membership_id))]
    pub async fn install_connect_agent(
        &self,
        request: &ConnectAgentRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<ObjectOutcome>> {
        let membership = self
            .require_ready(&request.membership_id, cancel)
            .await
            .step("confirming membership")?;

        let resources = with_cancel(
            cancel,
            "generate connect manifest",
            self.hub
                .generate_connect_manifest(&membership.name, &request.options),
        )
        .await
        .step("generating connect-agent manifests")?;

        let namespace = if request.options.namespace.is_empty() {
            DEFAULT_AGENT_NAMESPACE
        } else {
            request.options.namespace.as_str()
        };
        let outcomes = with_cancel(
            cancel,
            "reconcile connect agent",
            self.cluster.reconcile_connect_agent(
                &resources,
                namespace,
                request.service_account_key.clone(),
            ),
        )
        .await
        .step("reconciling connect agent")?;

        info!(objects = outcomes.len(), namespace = %namespace, "connect agent reconciled");
        Ok(outcomes)
    }

    /// Fetch a membership and insist it is READY under its expected name
    async fn require_ready(&self, membership_id: &str, cancel: &CancellationToken) -> Result<Membership> {
        let membership = lookup(&self.hub, membership_id, cancel).await?;
        let expected_name = self.hub.membership_name(membership_id);
        if membership.name != expected_name {
            return Err(Error::invalid_state(
                "membership name",
                expected_name,
                membership.name,
            ));
        }
        if membership.state_code() != StateCode::Ready {
            return Err(Error::invalid_state(
                membership.name.clone(),
                StateCode::Ready.to_string(),
                membership.state_code().to_string(),
            ));
        }
        Ok(membership)
    }

    /// One deletion poll: done when the membership is DELETING or gone
    async fn deletion_observed(&self, membership_id: &str) -> Result<bool> {
        match self.hub.get_membership(membership_id, false).await {
            Ok(Lookup::Found(m)) if m.state_code() == StateCode::Deleting => Ok(true),
            Ok(Lookup::Found(m)) => {
                debug!(state = %m.state_code(), "membership still exists");
                Ok(false)
            }
            Ok(Lookup::Absent) => Ok(true),
            Err(e) if e.is_not_found() => Ok(true),
            Err(e @ Error::Transport { .. }) => Err(e),
            Err(e) => Err(Error::unrecoverable(e)),
        }
    }
}

/// Current Hub view of a membership
///
/// Needs only the Hub, so it works without access to the member cluster.
pub async fn describe<H: HubApi>(
    hub: &H,
    membership_id: &str,
    cancel: &CancellationToken,
) -> Result<Membership> {
    lookup(hub, membership_id, cancel)
        .await
        .step("describing membership")
}

async fn lookup<H: HubApi>(
    hub: &H,
    membership_id: &str,
    cancel: &CancellationToken,
) -> Result<Membership> {
    let lookup = with_cancel(cancel, "get membership", hub.get_membership(membership_id, false)).await?;
    match lookup {
        Lookup::Found(membership) => Ok(membership),
        Lookup::Absent => Err(Error::not_found(hub.membership_name(membership_id))),
    }
}
