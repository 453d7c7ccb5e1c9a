use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use etcd_client::{Certificate, Client, ConnectOptions, GetOptions, Identity, TlsOptions};
use log::warn;
use tokio::sync::RwLock;

use common::images::{ImagesList, UnavailableImages, update_images_data};
use common::{Node, PodTask};

use crate::config::CatalogConfig;
use crate::{IMAGES_KEY, UNAVAILABLE_IMAGES_KEY};

/// The catalog operations the scheduler hooks and the resolver rely on.
///
/// [`CatalogStore`] is the production implementation;
/// [`crate::memory::MemoryCatalog`] backs tests and single-process setups.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Raw bytes of the multi-arch image list; empty when the key was
    /// never written. Hooks pin this snapshot into their cycle state.
    async fn images_snapshot(&self) -> Result<Vec<u8>>;

    /// Replaces the image list wholesale. Used by catalog seeding.
    async fn replace_images(&self, images: &ImagesList) -> Result<()>;

    /// Append-merges newly resolved entries onto the stored list.
    async fn append_images(&self, additions: &ImagesList) -> Result<()>;

    async fn get_unavailable(&self) -> Result<UnavailableImages>;

    /// Replaces the unavailable set in full.
    async fn put_unavailable(&self, set: &UnavailableImages) -> Result<()>;

    /// Adds `names` to the unavailable set, skipping the write when every
    /// name is already present.
    async fn mark_unavailable(&self, names: &[String]) -> Result<()> {
        let mut set = self.get_unavailable().await?;
        if set.merge(names) {
            self.put_unavailable(&set).await?;
        }
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodTask>>;

    async fn put_pod(&self, pod: &PodTask) -> Result<()>;
}

/// Client for the catalog keys and the pod/node registry.
///
/// The store is the single source of truth for image data; callers never
/// cache a value across scheduling cycles (the snapshot pinned in
/// `CycleState` is the one exception).
#[derive(Clone)]
pub struct CatalogStore {
    client: Arc<RwLock<Client>>,
}

impl CatalogStore {
    pub async fn connect(cfg: &CatalogConfig) -> Result<Self> {
        cfg.validate()?;
        let mut options = ConnectOptions::new()
            .with_connect_timeout(cfg.dial_timeout)
            .with_timeout(cfg.op_timeout);
        if cfg.tls_enabled() {
            options = options.with_tls(tls_options(cfg).await?);
        }
        let endpoints: Vec<&str> = cfg.endpoints.iter().map(|e| e.as_str()).collect();
        let client = Client::connect(&endpoints, Some(options))
            .await
            .context("connecting to catalog store")?;
        Ok(Self {
            client: Arc::new(RwLock::new(client)),
        })
    }

    pub async fn list_pods(&self) -> Result<Vec<PodTask>> {
        let mut client = self.client.write().await;
        let resp = client
            .get("/registry/pods/", Some(GetOptions::new().with_prefix()))
            .await
            .context("listing pods")?;
        let mut pods = Vec::new();
        for kv in resp.kvs() {
            match serde_yaml::from_slice::<PodTask>(kv.value()) {
                Ok(pod) => pods.push(pod),
                Err(e) => warn!(
                    "skipping undecodable pod at {}: {e}",
                    String::from_utf8_lossy(kv.key())
                ),
            }
        }
        Ok(pods)
    }

    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        let mut client = self.client.write().await;
        let resp = client
            .get("/registry/nodes/", Some(GetOptions::new().with_prefix()))
            .await
            .context("listing nodes")?;
        let mut nodes = Vec::new();
        for kv in resp.kvs() {
            match serde_yaml::from_slice::<Node>(kv.value()) {
                Ok(node) => nodes.push(node),
                Err(e) => warn!(
                    "skipping undecodable node at {}: {e}",
                    String::from_utf8_lossy(kv.key())
                ),
            }
        }
        Ok(nodes)
    }
}

#[async_trait]
impl Catalog for CatalogStore {
    async fn images_snapshot(&self) -> Result<Vec<u8>> {
        let mut client = self.client.write().await;
        let resp = client
            .get(IMAGES_KEY, None)
            .await
            .context("reading image catalog")?;
        Ok(resp.kvs().first().map(|kv| kv.value().to_vec()).unwrap_or_default())
    }

    async fn replace_images(&self, images: &ImagesList) -> Result<()> {
        let mut client = self.client.write().await;
        client
            .put(IMAGES_KEY, images.encode(), None)
            .await
            .context("writing image catalog")?;
        Ok(())
    }

    async fn append_images(&self, additions: &ImagesList) -> Result<()> {
        let mut client = self.client.write().await;
        let resp = client
            .get(IMAGES_KEY, None)
            .await
            .context("reading image catalog")?;
        let old = resp.kvs().first().map(|kv| kv.value()).unwrap_or_default();
        let merged = update_images_data(old, additions).context("merging image catalog")?;
        client
            .put(IMAGES_KEY, merged, None)
            .await
            .context("writing image catalog")?;
        Ok(())
    }

    async fn get_unavailable(&self) -> Result<UnavailableImages> {
        let mut client = self.client.write().await;
        let resp = client
            .get(UNAVAILABLE_IMAGES_KEY, None)
            .await
            .context("reading unavailable set")?;
        let data = resp.kvs().first().map(|kv| kv.value()).unwrap_or_default();
        UnavailableImages::decode(data).context("decoding unavailable set")
    }

    async fn put_unavailable(&self, set: &UnavailableImages) -> Result<()> {
        let mut client = self.client.write().await;
        client
            .put(UNAVAILABLE_IMAGES_KEY, set.encode(), None)
            .await
            .context("writing unavailable set")?;
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodTask>> {
        let key = format!("/registry/pods/{namespace}/{name}");
        let mut client = self.client.write().await;
        let resp = client.get(key, None).await.context("reading pod")?;
        match resp.kvs().first() {
            Some(kv) => Ok(Some(
                serde_yaml::from_slice(kv.value()).context("decoding pod")?,
            )),
            None => Ok(None),
        }
    }

    async fn put_pod(&self, pod: &PodTask) -> Result<()> {
        let value = serde_yaml::to_string(pod).context("encoding pod")?;
        let mut client = self.client.write().await;
        client
            .put(pod.registry_key(), value, None)
            .await
            .context("writing pod")?;
        Ok(())
    }
}

async fn tls_options(cfg: &CatalogConfig) -> Result<TlsOptions> {
    let (Some(ca_path), Some(cert_path), Some(key_path)) =
        (&cfg.ca_path, &cfg.cert_path, &cfg.key_path)
    else {
        anyhow::bail!("catalog TLS requires ca, cert and key together");
    };
    let ca = tokio::fs::read(ca_path)
        .await
        .context("reading catalog CA certificate")?;
    let cert = tokio::fs::read(cert_path)
        .await
        .context("reading catalog client certificate")?;
    let key = tokio::fs::read(key_path)
        .await
        .context("reading catalog client key")?;
    Ok(TlsOptions::new()
        .ca_certificate(Certificate::from_pem(ca))
        .identity(Identity::from_pem(cert, key)))
}
