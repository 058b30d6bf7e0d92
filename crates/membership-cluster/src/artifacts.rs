//! Exclusivity artifacts stored in the cluster
//!
//! Ownership of a cluster is recorded as the `memberships.hub.gke.io` CRD
//! plus one cluster-scoped `Membership` CR named `membership`. Both live at
//! fixed paths and are handled through raw REST calls, since the CRD may not
//! be installed and no typed client exists for the CR.

use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::Request;
use kube::Client;
use serde_json::Value;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use membership_common::yaml::parse_manifest;
use membership_common::{Error, Result, ResultExt, FIELD_MANAGER};
use membership_hub::ExclusivityManifests;

/// Collection path of CustomResourceDefinitions
pub const CRD_COLLECTION: &str = "/apis/apiextensions.k8s.io/v1/customresourcedefinitions";
/// Path of the membership CRD
pub const CRD_PATH: &str =
    "/apis/apiextensions.k8s.io/v1/customresourcedefinitions/memberships.hub.gke.io";
/// Collection path of membership CRs
pub const CR_COLLECTION: &str = "/apis/hub.gke.io/v1/memberships";
/// Path of the membership CR
pub const CR_PATH: &str = "/apis/hub.gke.io/v1/memberships/membership";

/// Raw REST access to the cluster's API server
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RawApi: Send + Sync {
    /// GET `path`; `None` when the server answers 404
    async fn get(&self, path: &str) -> Result<Option<String>>;

    /// POST a JSON body to a collection
    async fn create(&self, collection: &str, body: Vec<u8>) -> Result<()>;

    /// Server-side apply a JSON body to an existing object
    async fn apply(&self, path: &str, body: Vec<u8>) -> Result<()>;

    /// DELETE `path`; `false` when the object was already gone
    async fn delete(&self, path: &str) -> Result<bool>;
}

/// [`RawApi`] backed by a kube client
pub struct KubeRawApi {
    client: Client,
}

impl KubeRawApi {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, request: Request<Vec<u8>>) -> std::result::Result<String, kube::Error> {
        self.client.request_text(request).await
    }
}

fn build(
    builder: http::request::Builder,
    path: &str,
    body: Vec<u8>,
) -> Result<Request<Vec<u8>>> {
    builder
        .body(body)
        .map_err(|e| Error::transport(path, format!("invalid request: {}", e)))
}

#[async_trait]
impl RawApi for KubeRawApi {
    async fn get(&self, path: &str) -> Result<Option<String>> {
        let request = build(Request::get(path), path, Vec::new())?;
        match self.send(request).await {
            Ok(body) => Ok(Some(body)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, collection: &str, body: Vec<u8>) -> Result<()> {
        let builder = Request::post(collection).header(CONTENT_TYPE, "application/json");
        self.send(build(builder, collection, body)?).await?;
        Ok(())
    }

    async fn apply(&self, path: &str, body: Vec<u8>) -> Result<()> {
        let uri = format!("{}?fieldManager={}&force=true", path, FIELD_MANAGER);
        let builder = Request::patch(uri.as_str()).header(CONTENT_TYPE, "application/apply-patch+yaml");
        self.send(build(builder, path, body)?).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let request = build(Request::delete(path), path, Vec::new())?;
        match self.send(request).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reads, installs, and removes the exclusivity CRD and CR
pub struct ArtifactStore<R> {
    raw: R,
}

impl<R: RawApi> ArtifactStore<R> {
    /// Store over a raw API
    pub fn new(raw: R) -> Self {
        Self { raw }
    }

    /// Current CRD manifest, empty when the CRD is not installed
    pub async fn read_crd(&self) -> Result<String> {
        Ok(self.raw.get(CRD_PATH).await.step("reading CRD")?.unwrap_or_default())
    }

    /// Current CR manifest, empty when absent
    pub async fn read_cr(&self) -> Result<String> {
        Ok(self.raw.get(CR_PATH).await.step("reading CR")?.unwrap_or_default())
    }

    /// Existing artifacts; the CR is only read when the CRD is present
    pub async fn read_existing(&self) -> Result<ExclusivityManifests> {
        let crd_manifest = self.read_crd().await?;
        let cr_manifest = if crd_manifest.is_empty() {
            String::new()
        } else {
            self.read_cr().await?
        };
        debug!(
            has_crd = !crd_manifest.is_empty(),
            has_cr = !cr_manifest.is_empty(),
            "read exclusivity artifacts"
        );
        Ok(ExclusivityManifests {
            crd_manifest,
            cr_manifest,
        })
    }

    /// Create or server-side apply each non-empty manifest, CRD first
    pub async fn install(&self, crd_manifest: &str, cr_manifest: &str) -> Result<()> {
        self.install_one("CRD", CRD_COLLECTION, CRD_PATH, crd_manifest)
            .await
            .step("installing CRD")?;
        self.install_one("CR", CR_COLLECTION, CR_PATH, cr_manifest)
            .await
            .step("installing CR")?;
        Ok(())
    }

    /// Delete the CR and CRD; absence counts as success
    pub async fn delete_if_present(&self) -> Result<()> {
        for (label, path) in [("CR", CR_PATH), ("CRD", CRD_PATH)] {
            let deleted = self.raw.delete(path).await.step(&format!("deleting {}", label))?;
            if deleted {
                info!(artifact = label, "deleted exclusivity artifact");
            } else {
                debug!(artifact = label, "exclusivity artifact already absent");
            }
        }
        Ok(())
    }

    async fn install_one(
        &self,
        label: &str,
        collection: &str,
        path: &str,
        manifest: &str,
    ) -> Result<()> {
        let value = parse_manifest(manifest, label)?;
        if value == Value::Null {
            debug!(artifact = label, "no manifest to install");
            return Ok(());
        }
        let body = serde_json::to_vec(&value).map_err(|e| Error::decode(label, e.to_string()))?;

        if self.raw.get(path).await?.is_none() {
            self.raw.create(collection, body).await?;
            info!(artifact = label, "created exclusivity artifact");
        } else {
            self.raw.apply(path, body).await?;
            info!(artifact = label, "applied exclusivity artifact");
        }
        Ok(())
    }
}
