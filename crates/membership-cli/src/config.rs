//! Global flags and the clients built from them

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use membership_cluster::{Cluster, KubeAuth};
use membership_common::poll::{DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL};
use membership_common::telemetry::LogFormat;
use membership_common::{RetryPolicy, CURRENT_CONTEXT, DEFAULT_LOCATION};
use membership_hub::{HubClient, HubConfig, StaticToken, DEFAULT_ENDPOINT};
use membership_lifecycle::Orchestrator;

/// Flags shared by every command
#[derive(Args, Clone)]
pub struct GlobalArgs {
    /// Project owning the memberships
    #[arg(long, env = "HUB_PROJECT", global = true)]
    pub project: Option<String>,

    /// Membership location
    #[arg(long, env = "HUB_LOCATION", default_value = DEFAULT_LOCATION, global = true)]
    pub location: String,

    /// Hub API endpoint
    #[arg(long, env = "HUB_ENDPOINT", default_value = DEFAULT_ENDPOINT, global = true)]
    pub hub_endpoint: String,

    /// Kubeconfig for the member cluster (`KUBECONFIG` or ~/.kube/config when unset)
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context; "current" uses the kubeconfig's current context
    #[arg(long, default_value = CURRENT_CONTEXT, global = true)]
    pub context: String,

    /// OAuth access token for the Hub
    #[arg(long, env = "HUB_ACCESS_TOKEN", hide_env_values = true, global = true)]
    pub access_token: Option<String>,

    /// File holding the OAuth access token
    #[arg(long, conflicts_with = "access_token", global = true)]
    pub access_token_file: Option<PathBuf>,

    /// Log output format (text or json)
    #[arg(long, env = "MEMBERSHIPCTL_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Abort the whole command after this many seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Seconds between operation polls
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs(), global = true)]
    pub poll_interval_secs: u64,

    /// Maximum operation poll attempts
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS, global = true)]
    pub max_attempts: u32,
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("project", &self.project)
            .field("location", &self.location)
            .field("hub_endpoint", &self.hub_endpoint)
            .field("kubeconfig", &self.kubeconfig)
            .field("context", &self.context)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("access_token_file", &self.access_token_file)
            .field("log_format", &self.log_format)
            .field("timeout_secs", &self.timeout_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl GlobalArgs {
    /// Polling policy from the flags
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.poll_interval_secs),
        )
    }

    /// Cluster connection descriptor from the flags
    pub fn kube_auth(&self) -> KubeAuth {
        KubeAuth::new(self.kubeconfig.clone(), self.context.clone())
    }

    /// Access token from the flag or the token file
    fn access_token(&self) -> anyhow::Result<String> {
        if let Some(token) = &self.access_token {
            return Ok(token.clone());
        }
        if let Some(path) = &self.access_token_file {
            return std::fs::read_to_string(path)
                .with_context(|| format!("reading access token from {}", path.display()));
        }
        bail!("an access token is required: set --access-token, HUB_ACCESS_TOKEN, or --access-token-file")
    }

    /// Hub client for the configured project
    pub fn hub_client(&self) -> anyhow::Result<HubClient> {
        let Some(project) = self.project.as_deref().filter(|p| !p.is_empty()) else {
            bail!("a project is required: set --project or HUB_PROJECT");
        };
        let config = HubConfig::new(project)
            .with_base_url(self.hub_endpoint.clone())
            .with_location(self.location.clone());
        let token = StaticToken::new(self.access_token()?)?;
        Ok(HubClient::new(config, Arc::new(token))?)
    }

    /// Orchestrator wired to the Hub and the member cluster
    pub async fn orchestrator(&self) -> anyhow::Result<Orchestrator<HubClient, Cluster>> {
        let hub = self.hub_client()?;
        let cluster = Cluster::connect(&self.kube_auth())
            .await
            .context("connecting to the member cluster")?;
        Ok(Orchestrator::new(hub, cluster, self.retry_policy()))
    }

    /// Token cancelled on Ctrl-C or when `--timeout-secs` elapses
    pub fn cancellation(&self) -> CancellationToken {
        let cancel = CancellationToken::new();

        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling");
                on_signal.cancel();
            }
        });

        if let Some(secs) = self.timeout_secs {
            let on_deadline = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                warn!(timeout_secs = secs, "deadline reached, cancelling");
                on_deadline.cancel();
            });
        }

        cancel
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::Cli;

    #[test]
    fn defaults_match_hub_conventions() {
        let cli = Cli::parse_from(["membershipctl", "describe", "cluster-a"]);
        assert_eq!(cli.global.location, "global");
        assert_eq!(cli.global.context, "current");
        assert_eq!(cli.global.max_attempts, 60);
        assert_eq!(cli.global.poll_interval_secs, 5);
        assert_eq!(cli.global.retry_policy().max_attempts, 60);
    }

    #[test]
    fn missing_project_is_reported() {
        let cli = Cli::parse_from([
            "membershipctl",
            "describe",
            "cluster-a",
            "--project",
            "",
            "--access-token",
            "t",
        ]);
        let err = cli.global.hub_client().err().unwrap();
        assert!(err.to_string().contains("project is required"));
    }

    #[test]
    fn token_file_is_read_and_trimmed() {
        let path = std::env::temp_dir().join(format!("membershipctl-token-{}", std::process::id()));
        std::fs::write(&path, "ya29.file-token\n").unwrap();

        let cli = Cli::parse_from([
            "membershipctl",
            "--project",
            "proj1",
            "--access-token-file",
            path.to_str().unwrap(),
            "describe",
            "cluster-a",
        ]);
        let hub = cli.global.hub_client().unwrap();
        assert_eq!(hub.config().project, "proj1");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn debug_output_redacts_access_token() {
        let cli = Cli::parse_from([
            "membershipctl",
            "--access-token",
            "ya29.secret-value",
            "describe",
            "cluster-a",
        ]);
        let rendered = format!("{cli:?}");
        assert!(!rendered.contains("ya29.secret-value"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn kube_auth_carries_path_and_context() {
        let cli = Cli::parse_from([
            "membershipctl",
            "--kubeconfig",
            "/tmp/kc",
            "--context",
            "kind-dev",
            "describe",
            "cluster-a",
        ]);
        let auth = cli.global.kube_auth();
        assert_eq!(auth.config_file.unwrap().to_str(), Some("/tmp/kc"));
        assert_eq!(auth.context, "kind-dev");
    }
}
