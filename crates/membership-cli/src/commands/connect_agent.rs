//! Connect-agent command - install or upgrade the agent for a membership

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;

use membership_common::DEFAULT_AGENT_NAMESPACE;
use membership_hub::ConnectAgentOptions;
use membership_lifecycle::ConnectAgentRequest;

use crate::config::GlobalArgs;

/// Connect-agent command arguments
#[derive(Args, Debug)]
pub struct ConnectAgentArgs {
    /// Membership id
    pub membership_id: String,

    /// Namespace to install the agent into
    #[arg(long, default_value = DEFAULT_AGENT_NAMESPACE)]
    pub namespace: String,

    /// HTTP(S) proxy for agent traffic
    #[arg(long, default_value = "")]
    pub proxy: String,

    /// Agent version (server default when empty)
    #[arg(long, default_value = "")]
    pub agent_version: String,

    /// Upgrade an existing agent, skipping one-time resources
    #[arg(long)]
    pub upgrade: bool,

    /// Alternate image registry
    #[arg(long, default_value = "")]
    pub registry: String,

    /// File with the image pull secret
    #[arg(long)]
    pub image_pull_secret_file: Option<PathBuf>,

    /// Service-account key stored in the agent's credential secret
    #[arg(long)]
    pub service_account_key_file: Option<PathBuf>,
}

fn read_optional(path: Option<&Path>, what: &str) -> anyhow::Result<Option<Vec<u8>>> {
    path.map(|p| std::fs::read(p).with_context(|| format!("reading {} from {}", what, p.display())))
        .transpose()
}

impl ConnectAgentArgs {
    fn into_request(self) -> anyhow::Result<ConnectAgentRequest> {
        let image_pull_secret_content =
            read_optional(self.image_pull_secret_file.as_deref(), "image pull secret")?
                .unwrap_or_default();
        let service_account_key =
            read_optional(self.service_account_key_file.as_deref(), "service account key")?;

        Ok(ConnectAgentRequest {
            membership_id: self.membership_id,
            options: ConnectAgentOptions {
                proxy: self.proxy,
                namespace: self.namespace,
                version: self.agent_version,
                is_upgrade: self.upgrade,
                registry: self.registry,
                image_pull_secret_content,
            },
            service_account_key,
        })
    }
}

/// Run the connect-agent command
pub async fn run(global: &GlobalArgs, args: ConnectAgentArgs) -> anyhow::Result<()> {
    let request = args.into_request()?;
    let orchestrator = global.orchestrator().await?;
    let cancel = global.cancellation();

    let outcomes = orchestrator
        .install_connect_agent(&request, &cancel)
        .await
        .with_context(|| format!("installing connect agent for {}", request.membership_id))?;

    for outcome in outcomes {
        println!("{:<10} {}", format!("{:?}", outcome.action), outcome.object);
    }
    Ok(())
}
