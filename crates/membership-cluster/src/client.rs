//! Kubernetes client construction and cluster identity

use std::path::PathBuf;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use tracing::debug;

use membership_common::{Error, Result, CURRENT_CONTEXT};

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Namespace whose UID identifies the cluster
const IDENTITY_NAMESPACE: &str = "kube-system";

/// Cluster connection descriptor
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KubeAuth {
    /// Kubeconfig path; `None` reads the default location
    pub config_file: Option<PathBuf>,
    /// Context name; empty or `current` selects the kubeconfig's current context
    pub context: String,
}

impl KubeAuth {
    /// Descriptor for a kubeconfig file and context
    pub fn new(config_file: Option<PathBuf>, context: impl Into<String>) -> Self {
        Self {
            config_file,
            context: context.into(),
        }
    }

    /// Explicit context override, if any
    fn context_override(&self) -> Option<String> {
        match self.context.as_str() {
            "" | CURRENT_CONTEXT => None,
            name => Some(name.to_string()),
        }
    }
}

/// Create a kube client from a connection descriptor with default timeouts
pub async fn create_client(auth: &KubeAuth) -> Result<Client> {
    create_client_with_timeout(auth, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from a connection descriptor with custom timeouts
pub async fn create_client_with_timeout(
    auth: &KubeAuth,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client> {
    let kubeconfig = match &auth.config_file {
        Some(path) => Kubeconfig::read_from(path).map_err(|e| {
            Error::config(format!(
                "failed to read kubeconfig {}: {}",
                path.display(),
                e
            ))
        })?,
        None => Kubeconfig::read()
            .map_err(|e| Error::config(format!("failed to read default kubeconfig: {}", e)))?,
    };
    let options = KubeConfigOptions {
        context: auth.context_override(),
        ..Default::default()
    };
    let mut config = Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(|e| Error::config(format!("failed to load kubeconfig: {}", e)))?;
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);

    debug!(cluster_url = %config.cluster_url, context = ?options.context, "kube client configured");
    Client::try_from(config).map_err(|e| Error::config(format!("failed to create client: {}", e)))
}

/// The cluster's UUID: the UID of the `kube-system` namespace
pub async fn cluster_uuid(client: &Client) -> Result<String> {
    let api: Api<Namespace> = Api::all(client.clone());
    let ns = api.get(IDENTITY_NAMESPACE).await?;
    ns.metadata
        .uid
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| Error::decode("kube-system namespace", "metadata.uid is missing"))
}
