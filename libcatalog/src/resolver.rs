use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;

use common::Arch;
use common::images::{ImageVariant, ImagesList, MultiArchImages, UnavailableImages};

use crate::store::Catalog;

/// Default period between resolver ticks.
pub const DEFAULT_RESOLVE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("inspect command failed: {0}")]
    Command(String),
    #[error("unreadable manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Source of per-architecture manifest information for an image reference.
#[async_trait]
pub trait ManifestInspector: Send + Sync {
    async fn inspect(&self, image: &str) -> Result<Vec<ImageVariant>, InspectError>;
}

/// Shells out to a registry-inspection command (`docker manifest inspect`
/// or compatible). The command template substitutes `{image}`; images whose
/// reference contains the insecure-registry substring get an extra
/// `--insecure` flag.
pub struct CommandInspector {
    template: String,
    insecure_substring: String,
}

impl CommandInspector {
    pub fn new(template: impl Into<String>, insecure_substring: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            insecure_substring: insecure_substring.into(),
        }
    }

    fn command_line(&self, image: &str) -> String {
        let mut line = self.template.replace("{image}", image);
        if !self.insecure_substring.is_empty() && image.contains(&self.insecure_substring) {
            line.push_str(" --insecure");
        }
        line
    }
}

#[async_trait]
impl ManifestInspector for CommandInspector {
    async fn inspect(&self, image: &str) -> Result<Vec<ImageVariant>, InspectError> {
        let line = self.command_line(image);
        debug!("inspecting manifest: {line}");
        let output = Command::new("sh")
            .arg("-c")
            .arg(&line)
            .output()
            .await
            .map_err(|e| InspectError::Command(e.to_string()))?;
        if !output.status.success() {
            return Err(InspectError::Command(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(variants_from_manifest(image, &output.stdout)?)
    }
}

#[derive(Deserialize)]
struct ManifestDocument {
    #[serde(default)]
    manifests: Vec<ManifestEntry>,
}

#[derive(Deserialize)]
struct ManifestEntry {
    platform: Option<ManifestPlatform>,
}

#[derive(Deserialize)]
struct ManifestPlatform {
    architecture: String,
    #[serde(default)]
    os: String,
}

/// Turns a manifest document into catalog variants.
///
/// Manifest lists yield one variant per linux architecture: the amd64 child
/// keeps the catalog image name, every other architecture appends
/// `-{arch}` to the reference. A single-image manifest falls back to the
/// name-keyword heuristic.
pub fn variants_from_manifest(
    image: &str,
    manifest: &[u8],
) -> Result<Vec<ImageVariant>, serde_json::Error> {
    let doc: ManifestDocument = serde_json::from_slice(manifest)?;
    if doc.manifests.is_empty() {
        return Ok(vec![ImageVariant {
            name: image.to_string(),
            arch: arch_from_keywords(image),
            os: Default::default(),
        }]);
    }

    let mut variants: Vec<ImageVariant> = Vec::new();
    for entry in &doc.manifests {
        let Some(platform) = &entry.platform else {
            continue;
        };
        if platform.os != "linux" {
            continue;
        }
        let Ok(arch) = platform.architecture.parse::<Arch>() else {
            // attestation manifests report architecture "unknown"
            continue;
        };
        if variants.iter().any(|v| v.arch == arch) {
            continue;
        }
        let name = if arch == Arch::Amd64 {
            image.to_string()
        } else {
            format!("{image}-{arch}")
        };
        variants.push(ImageVariant {
            name,
            arch,
            os: Default::default(),
        });
    }
    Ok(variants)
}

/// Guesses the architecture of a single-manifest image from its name.
/// `arm64` shadows `arm`; unmatched names default to amd64.
pub fn arch_from_keywords(image: &str) -> Arch {
    for arch in Arch::ALL {
        if image.contains(arch.as_str()) {
            return arch;
        }
    }
    Arch::Amd64
}

/// Splits the unavailable set into resolved catalog entries and the images
/// that stay unavailable for the next tick. Per-image failures are
/// non-fatal.
pub async fn resolve_images(
    unavailable: &UnavailableImages,
    inspector: &dyn ManifestInspector,
) -> (ImagesList, UnavailableImages) {
    let mut resolved = ImagesList::default();
    let mut still_unavailable = UnavailableImages::default();
    for image in &unavailable.images {
        match inspector.inspect(image).await {
            Ok(variants) if !variants.is_empty() => {
                info!("resolved {image} to {} variant(s)", variants.len());
                resolved.list.push(MultiArchImages {
                    name: image.clone(),
                    images: variants,
                });
            }
            Ok(_) => {
                warn!("manifest of {image} exposed no usable variants");
                still_unavailable.insert(image);
            }
            Err(e) => {
                warn!("failed to inspect {image}: {e}");
                still_unavailable.insert(image);
            }
        }
    }
    (resolved, still_unavailable)
}

/// Background loop draining the unavailable set into the catalog.
pub struct Resolver {
    store: Arc<dyn Catalog>,
    inspector: Box<dyn ManifestInspector>,
    interval: Duration,
}

impl Resolver {
    pub fn new(store: Arc<dyn Catalog>, inspector: Box<dyn ManifestInspector>) -> Self {
        Self {
            store,
            inspector,
            interval: DEFAULT_RESOLVE_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One resolver pass. Store errors abort the pass; the next tick
    /// retries with a fresh read of the unavailable set.
    pub async fn tick(&self) -> Result<()> {
        let unavailable = self.store.get_unavailable().await?;
        if unavailable.is_empty() {
            return Ok(());
        }
        let (resolved, still_unavailable) =
            resolve_images(&unavailable, self.inspector.as_ref()).await;
        if !resolved.list.is_empty() {
            self.store.append_images(&resolved).await?;
        }
        self.store.put_unavailable(&still_unavailable).await?;
        Ok(())
    }

    pub async fn run(&self) {
        loop {
            if let Err(e) = self.tick().await {
                error!("resolver tick failed: {e:#}");
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use common::arch::Os;

    use super::*;

    struct FakeInspector {
        manifests: HashMap<String, Vec<ImageVariant>>,
    }

    #[async_trait]
    impl ManifestInspector for FakeInspector {
        async fn inspect(&self, image: &str) -> Result<Vec<ImageVariant>, InspectError> {
            self.manifests
                .get(image)
                .cloned()
                .ok_or_else(|| InspectError::Command(format!("no such manifest: {image}")))
        }
    }

    #[test]
    fn keyword_heuristic_prefers_longer_arch_names() {
        assert_eq!(arch_from_keywords("nginx-arm64:latest"), Arch::Arm64);
        assert_eq!(arch_from_keywords("nginx-arm:latest"), Arch::Arm);
        assert_eq!(arch_from_keywords("nginx:latest"), Arch::Amd64);
        assert_eq!(arch_from_keywords("registry:5000/db-s390x:1"), Arch::S390x);
    }

    #[test]
    fn manifest_list_yields_one_variant_per_linux_arch() {
        let manifest = br#"{
            "schemaVersion": 2,
            "manifests": [
                {"digest": "sha256:aa", "platform": {"architecture": "amd64", "os": "linux"}},
                {"digest": "sha256:bb", "platform": {"architecture": "arm64", "os": "linux"}},
                {"digest": "sha256:cc", "platform": {"architecture": "amd64", "os": "windows"}},
                {"digest": "sha256:dd", "platform": {"architecture": "unknown", "os": "unknown"}}
            ]
        }"#;
        let variants = variants_from_manifest("reg:5000/nginx:latest", manifest).unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].name, "reg:5000/nginx:latest");
        assert_eq!(variants[0].arch, Arch::Amd64);
        assert_eq!(variants[1].name, "reg:5000/nginx:latest-arm64");
        assert_eq!(variants[1].arch, Arch::Arm64);
    }

    #[test]
    fn single_manifest_falls_back_to_keywords() {
        let manifest = br#"{"schemaVersion": 2, "config": {"digest": "sha256:aa"}}"#;
        let variants = variants_from_manifest("reg:5000/cache-arm64:1", manifest).unwrap();
        assert_eq!(
            variants,
            vec![ImageVariant {
                name: "reg:5000/cache-arm64:1".to_string(),
                arch: Arch::Arm64,
                os: Os::Linux,
            }]
        );
    }

    #[test]
    fn insecure_flag_is_appended_for_matching_registries() {
        let inspector = CommandInspector::new("docker manifest inspect {image}", "local-registry");
        assert_eq!(
            inspector.command_line("local-registry:5000/nginx:latest"),
            "docker manifest inspect local-registry:5000/nginx:latest --insecure"
        );
        assert_eq!(
            inspector.command_line("docker.io/nginx:latest"),
            "docker manifest inspect docker.io/nginx:latest"
        );
    }

    #[tokio::test]
    async fn tick_moves_resolved_images_into_the_catalog() {
        use crate::memory::MemoryCatalog;

        let store = Arc::new(MemoryCatalog::new());
        store
            .mark_unavailable(&["foo".to_string(), "bar".to_string()])
            .await
            .unwrap();

        let mut manifests = HashMap::new();
        manifests.insert(
            "foo".to_string(),
            vec![ImageVariant {
                name: "foo-x".to_string(),
                arch: Arch::Amd64,
                os: Os::Linux,
            }],
        );
        let resolver = Resolver::new(store.clone(), Box::new(FakeInspector { manifests }));
        resolver.tick().await.unwrap();

        let snapshot = store.images_snapshot().await.unwrap();
        let catalog = ImagesList::decode(&snapshot).unwrap();
        assert_eq!(catalog.variants_of("foo").unwrap()[0].name, "foo-x");
        assert!(catalog.variants_of("bar").is_none());

        // Resolved images leave the unavailable set; failed ones stay.
        let unavailable = store.get_unavailable().await.unwrap();
        assert_eq!(unavailable.images, vec!["bar".to_string()]);
        assert!(!unavailable.contains("foo"));
    }

    #[tokio::test]
    async fn resolve_images_partitions_successes_and_failures() {
        let mut manifests = HashMap::new();
        manifests.insert(
            "foo".to_string(),
            vec![ImageVariant {
                name: "foo-x".to_string(),
                arch: Arch::Amd64,
                os: Os::Linux,
            }],
        );
        let inspector = FakeInspector { manifests };

        let mut unavailable = UnavailableImages::default();
        unavailable.insert("foo");
        unavailable.insert("bar");

        let (resolved, still) = resolve_images(&unavailable, &inspector).await;
        assert_eq!(resolved.list.len(), 1);
        assert_eq!(resolved.list[0].name, "foo");
        assert_eq!(still.images, vec!["bar".to_string()]);

        // No image may end up both resolved and still unavailable.
        for entry in &resolved.list {
            assert!(!still.contains(&entry.name));
        }
    }
}
