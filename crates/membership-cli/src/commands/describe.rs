//! Describe command - print a membership as the Hub sees it

use anyhow::Context;
use clap::Args;

use crate::commands::print_json;
use crate::config::GlobalArgs;

/// Describe command arguments
#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// Membership id
    pub membership_id: String,
}

/// Run the describe command
///
/// Only talks to the Hub; no kubeconfig is needed.
pub async fn run(global: &GlobalArgs, args: DescribeArgs) -> anyhow::Result<()> {
    let hub = global.hub_client()?;
    let cancel = global.cancellation();

    let membership = membership_lifecycle::describe(&hub, &args.membership_id, &cancel)
        .await
        .with_context(|| format!("describing {}", args.membership_id))?;

    print_json(&serde_json::to_value(&membership)?)
}
