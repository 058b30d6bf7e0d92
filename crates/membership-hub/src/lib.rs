//! Hub membership REST client
//!
//! [`HubClient`] is an authenticated facade over the Hub's membership
//! resource. It covers three concerns, one module each:
//!
//! - [`membership`] - get, create, delete, and long-running operation lookup
//! - [`exclusivity`] - pre-flight exclusivity validation and CRD/CR generation
//! - [`connect`] - connect-agent manifest generation
//!
//! The client never waits on operations itself; callers poll
//! [`HubClient::check_operation`] through
//! [`membership_common::wait_until_done`].

#![deny(missing_docs)]

pub mod auth;
pub mod client;
pub mod connect;
pub mod exclusivity;
pub mod membership;
pub mod types;

pub use auth::{StaticToken, TokenSource};
pub use client::{HubClient, HubConfig};
pub use connect::ConnectAgentOptions;
pub use membership::Lookup;
pub use types::{
    ConnectAgentResource, ExclusivityManifests, Membership, MembershipState, Operation, StateCode,
};

/// Default Hub API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://gkehub.googleapis.com/";

/// OAuth scope requested for Hub calls
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// API version for membership CRUD and operations
pub const API_V1: &str = "v1";

/// API version for exclusivity and connect-manifest generation
pub const API_V1BETA1: &str = "v1beta1";
