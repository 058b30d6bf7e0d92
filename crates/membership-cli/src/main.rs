//! membershipctl
//!
//! Registers a Kubernetes cluster with a fleet Hub and manages its connect
//! agent.

use clap::Parser;

use membership_cli::Cli;
use membership_common::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.log_format)?;
    cli.run().await
}
