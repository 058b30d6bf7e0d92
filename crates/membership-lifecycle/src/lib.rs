//! Membership lifecycle workflows
//!
//! [`Orchestrator`] coordinates the Hub and the member cluster:
//!
//! - register: `ABSENT -> CREATING -> READY`, then exclusivity artifacts
//! - unregister: `READY -> DELETING`, optionally removing the artifacts
//! - connect agent: manifest generation and in-cluster reconciliation
//! - describe: read-only lookup

#![deny(missing_docs)]

pub mod clients;
pub mod orchestrator;

pub use clients::{ClusterOps, HubApi};
pub use orchestrator::{
    describe, ConnectAgentRequest, Orchestrator, RegisterRequest, Registration, UnregisterRequest,
};
