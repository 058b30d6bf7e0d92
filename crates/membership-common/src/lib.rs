//! Common types for Hub membership management: errors, polling, and utilities

#![deny(missing_docs)]

pub mod cancel;
pub mod error;
pub mod poll;
pub mod telemetry;
pub mod yaml;

pub use cancel::with_cancel;
pub use error::{Error, ResultExt};
pub use poll::{wait_until_done, RetryPolicy};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Location used for memberships when none is configured
pub const DEFAULT_LOCATION: &str = "global";

/// Namespace the connect agent is installed into unless overridden
pub const DEFAULT_AGENT_NAMESPACE: &str = "gke-connect";

/// Kubeconfig context name meaning "whatever the kubeconfig selects"
pub const CURRENT_CONTEXT: &str = "current";

/// Field manager used for server-side apply patches
pub const FIELD_MANAGER: &str = "membershipctl";
