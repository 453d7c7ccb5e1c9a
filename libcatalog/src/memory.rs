use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use common::PodTask;
use common::images::{ImagesList, UnavailableImages, update_images_data};

use crate::store::Catalog;

/// In-memory catalog backend with the same key semantics as the store:
/// whole-value replacement, append-merge for the image list. Backs tests
/// and single-process setups that don't want an external store.
#[derive(Default)]
pub struct MemoryCatalog {
    images: RwLock<Vec<u8>>,
    unavailable: RwLock<Vec<u8>>,
    pods: RwLock<HashMap<String, String>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the catalog with a seeded image list.
    pub fn with_images(images: &ImagesList) -> Self {
        Self {
            images: RwLock::new(images.encode()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn images_snapshot(&self) -> Result<Vec<u8>> {
        Ok(self.images.read().await.clone())
    }

    async fn replace_images(&self, images: &ImagesList) -> Result<()> {
        *self.images.write().await = images.encode();
        Ok(())
    }

    async fn append_images(&self, additions: &ImagesList) -> Result<()> {
        let mut images = self.images.write().await;
        *images = update_images_data(&images, additions).context("merging image catalog")?;
        Ok(())
    }

    async fn get_unavailable(&self) -> Result<UnavailableImages> {
        UnavailableImages::decode(&self.unavailable.read().await)
            .context("decoding unavailable set")
    }

    async fn put_unavailable(&self, set: &UnavailableImages) -> Result<()> {
        *self.unavailable.write().await = set.encode();
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodTask>> {
        let key = format!("/registry/pods/{namespace}/{name}");
        match self.pods.read().await.get(&key) {
            Some(yaml) => Ok(Some(serde_yaml::from_str(yaml).context("decoding pod")?)),
            None => Ok(None),
        }
    }

    async fn put_pod(&self, pod: &PodTask) -> Result<()> {
        let value = serde_yaml::to_string(pod).context("encoding pod")?;
        self.pods.write().await.insert(pod.registry_key(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::Arch;
    use common::arch::Os;
    use common::images::{ImageVariant, MultiArchImages};

    use super::*;

    #[tokio::test]
    async fn catalog_semantics_match_the_store() {
        let catalog = MemoryCatalog::new();
        assert!(catalog.images_snapshot().await.unwrap().is_empty());

        let additions = ImagesList {
            list: vec![MultiArchImages {
                name: "nginx".to_string(),
                images: vec![ImageVariant {
                    name: "nginx".to_string(),
                    arch: Arch::Amd64,
                    os: Os::Linux,
                }],
            }],
        };
        catalog.append_images(&additions).await.unwrap();
        let snapshot = catalog.images_snapshot().await.unwrap();
        let decoded = ImagesList::decode(&snapshot).unwrap();
        assert_eq!(decoded.list.len(), 1);

        catalog
            .mark_unavailable(&["foo".to_string(), "foo".to_string()])
            .await
            .unwrap();
        let set = catalog.get_unavailable().await.unwrap();
        assert_eq!(set.images, vec!["foo".to_string()]);
    }
}
