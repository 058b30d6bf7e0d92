//! Register command - create a membership for the current cluster

use anyhow::Context;
use clap::Args;
use serde_json::json;

use membership_lifecycle::RegisterRequest;

use crate::commands::print_json;
use crate::config::GlobalArgs;

/// Register command arguments
#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Membership id, e.g. "cluster-a"
    pub membership_id: String,

    /// Membership description (defaults to the membership id)
    #[arg(long, default_value = "")]
    pub description: String,

    /// Self-link of the cluster resource
    #[arg(long, default_value = "")]
    pub resource_link: String,
}

/// Run the register command
pub async fn run(global: &GlobalArgs, args: RegisterArgs) -> anyhow::Result<()> {
    let orchestrator = global.orchestrator().await?;
    let cancel = global.cancellation();

    let request = RegisterRequest {
        membership_id: args.membership_id,
        description: args.description,
        resource_link: args.resource_link,
    };
    let registration = orchestrator
        .register(&request, &cancel)
        .await
        .with_context(|| format!("registering {}", request.membership_id))?;

    print_json(&json!({
        "name": registration.membership.name,
        "clusterUuid": registration.cluster_uuid,
        "state": registration.membership.state_code().to_string(),
    }))
}
