//! Membership CRUD and long-running operation lookup

use reqwest::Method;
use serde::Serialize;
use tracing::{debug, info};

use membership_common::{Error, Result};

use crate::client::{decode, ensure_success, HubClient};
use crate::types::{Membership, Operation};
use crate::API_V1;

/// Outcome of a membership lookup
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup {
    /// The membership exists
    Found(Membership),
    /// The membership does not exist and the caller expected that
    Absent,
}

impl Lookup {
    /// The membership, if one was found
    pub fn into_membership(self) -> Option<Membership> {
        match self {
            Lookup::Found(m) => Some(m),
            Lookup::Absent => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody<'a> {
    description: &'a str,
    external_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<EndpointBody<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EndpointBody<'a> {
    gke_cluster: GkeClusterBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GkeClusterBody<'a> {
    resource_link: &'a str,
}

impl HubClient {
    /// Look up a membership.
    ///
    /// With `expect_absent`, a 404 is the success path and yields
    /// [`Lookup::Absent`] while a 2xx fails with [`Error::AlreadyExists`].
    /// Without it, a 404 fails with [`Error::NotFound`]. Any other non-2xx
    /// status fails with [`Error::Api`].
    pub async fn get_membership(&self, membership_id: &str, expect_absent: bool) -> Result<Lookup> {
        let name = self.membership_name(membership_id);
        let url = self.url(API_V1, &name);
        let request = self.request(Method::GET, &url).await?;
        let (status, body) = self.send("get membership", request).await?;

        match (status, expect_absent) {
            (404, true) => {
                debug!(membership = %name, "membership absent as expected");
                Ok(Lookup::Absent)
            }
            (404, false) => Err(Error::not_found(format!("membership {}", name))),
            (200..=299, true) => Err(Error::already_exists(format!("membership {}", name), body)),
            (200..=299, false) => Ok(Lookup::Found(decode("get membership", &body)?)),
            _ => Err(Error::api("get membership", status, body)),
        }
    }

    /// Issue the creation call; the returned operation is not awaited
    pub async fn create_membership(
        &self,
        membership_id: &str,
        description: &str,
        external_id: &str,
        resource_link: &str,
    ) -> Result<Operation> {
        let url = self.url(API_V1, &format!("{}/memberships", self.parent()));
        let body = CreateBody {
            description,
            external_id,
            endpoint: (!resource_link.is_empty()).then_some(EndpointBody {
                gke_cluster: GkeClusterBody { resource_link },
            }),
        };
        let request = self
            .request(Method::POST, &url)
            .await?
            .query(&[("membershipId", membership_id)])
            .json(&body);
        let (status, body) = self.send("create membership", request).await?;
        ensure_success("create membership", status, &body)?;

        let op: Operation = decode("create membership", &body)?;
        info!(membership = %membership_id, operation = %op.name, "membership creation started");
        Ok(op)
    }

    /// Issue the deletion call; the returned operation is not awaited
    pub async fn delete_membership(&self, membership_id: &str) -> Result<Operation> {
        let url = self.url(API_V1, &self.membership_name(membership_id));
        let request = self.request(Method::DELETE, &url).await?;
        let (status, body) = self.send("delete membership", request).await?;
        ensure_success("delete membership", status, &body)?;

        let op: Operation = decode("delete membership", &body)?;
        info!(membership = %membership_id, operation = %op.name, "membership deletion started");
        Ok(op)
    }

    /// Single non-blocking poll of a long-running operation.
    ///
    /// Non-2xx responses, malformed payloads, and operations that finished
    /// with an error status are all [`Error::Unrecoverable`]. A transport
    /// failure stays retryable.
    pub async fn check_operation(&self, operation_name: &str) -> Result<bool> {
        let url = self.url(API_V1, operation_name);
        let request = self.request(Method::GET, &url).await?;
        let (status, body) = self.send("get operation", request).await?;
        ensure_success("get operation", status, &body).map_err(Error::unrecoverable)?;

        let op: Operation = decode("get operation", &body).map_err(Error::unrecoverable)?;
        if !op.done {
            debug!(operation = %operation_name, "operation not done");
            return Ok(false);
        }
        if let Some(status) = op.error.filter(|s| s.code != 0) {
            return Err(Error::unrecoverable(Error::operation_failed(
                operation_name,
                status.code,
                status.message,
            )));
        }
        Ok(true)
    }
}
