//! Unregister command - delete a membership

use anyhow::Context;
use clap::Args;

use membership_lifecycle::UnregisterRequest;

use crate::config::GlobalArgs;

/// Unregister command arguments
#[derive(Args, Debug)]
pub struct UnregisterArgs {
    /// Membership id
    pub membership_id: String,

    /// Leave the exclusivity CRD and CR in the cluster
    #[arg(long)]
    pub keep_artifacts: bool,
}

/// Run the unregister command
pub async fn run(global: &GlobalArgs, args: UnregisterArgs) -> anyhow::Result<()> {
    let orchestrator = global.orchestrator().await?;
    let cancel = global.cancellation();

    let request = UnregisterRequest {
        membership_id: args.membership_id,
        delete_artifacts: !args.keep_artifacts,
    };
    orchestrator
        .unregister(&request, &cancel)
        .await
        .with_context(|| format!("unregistering {}", request.membership_id))?;

    println!("membership {} is being deleted", request.membership_id);
    Ok(())
}
