//! Content-addressable image store.
//!
//! Blobs live under `blobs/sha256/<hex>`; an `images.json` index maps each
//! image reference to its manifest digest, config and layers. Blobs shared
//! between images are stored, and fetched, once.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use airgap_core::config::PullPolicy;
use airgap_core::error::{BundleError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::reference::ImageReference;
use super::registry::{BlobDescriptor, RegistryClient};

/// Metadata for a stored image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredImage {
    /// Canonical reference (e.g., "docker.io/rancher/mirrored-pause:3.9")
    pub reference: String,
    /// `registry/repository:tag`, when the reference carries a tag
    pub repo_tag: Option<String>,
    /// Manifest digest
    pub manifest_digest: String,
    /// Image configuration blob
    pub config: BlobDescriptor,
    /// Layer blobs, bottom to top
    pub layers: Vec<BlobDescriptor>,
    /// When the image was pulled
    pub pulled_at: DateTime<Utc>,
}

/// Result of [`ContentStore::pull`].
#[derive(Debug, Clone)]
pub enum PullOutcome {
    /// The image was already indexed; nothing was fetched.
    Present(StoredImage),
    /// The image was pulled from the registry.
    Pulled {
        image: StoredImage,
        /// Blobs downloaded for this image
        fetched: usize,
        /// Blobs already present in the store
        reused: usize,
    },
}

impl PullOutcome {
    pub fn image(&self) -> &StoredImage {
        match self {
            PullOutcome::Present(image) => image,
            PullOutcome::Pulled { image, .. } => image,
        }
    }

    pub fn into_image(self) -> StoredImage {
        match self {
            PullOutcome::Present(image) => image,
            PullOutcome::Pulled { image, .. } => image,
        }
    }
}

/// Persistent index stored as JSON on disk.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreIndex {
    images: Vec<StoredImage>,
}

/// Disk-backed content store.
pub struct ContentStore {
    /// Root directory of the store
    root: PathBuf,
    /// In-memory index: reference → StoredImage
    index: RwLock<HashMap<String, StoredImage>>,
}

impl ContentStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let blobs = root.join("blobs").join("sha256");
        std::fs::create_dir_all(&blobs).map_err(|e| BundleError::StoreSetup {
            step: "create store".to_string(),
            message: format!("{}: {}", blobs.display(), e),
        })?;

        let index = load_index(&root.join("images.json"))?;
        Ok(Self {
            root: root.to_path_buf(),
            index: RwLock::new(index),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get a stored image by reference.
    pub async fn get(&self, reference: &str) -> Option<StoredImage> {
        let key = ImageReference::parse(reference).ok()?.full_reference();
        self.index.read().await.get(&key).cloned()
    }

    /// List all stored images.
    pub async fn list(&self) -> Vec<StoredImage> {
        self.index.read().await.values().cloned().collect()
    }

    /// Path of a blob inside the store.
    pub fn blob_path(&self, digest: &str) -> Result<PathBuf> {
        let hex = digest_hex(digest)?;
        Ok(self.root.join("blobs").join("sha256").join(hex))
    }

    pub fn has_blob(&self, digest: &str) -> bool {
        self.blob_path(digest).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Pull an image into the store according to `policy`.
    ///
    /// Any failure is reported as [`BundleError::Pull`] naming `reference`.
    pub async fn pull(
        &self,
        reference: &str,
        policy: PullPolicy,
        registry: &dyn RegistryClient,
    ) -> Result<PullOutcome> {
        self.pull_inner(reference, policy, registry)
            .await
            .map_err(|e| match e {
                pull @ BundleError::Pull { .. } => pull,
                other => BundleError::pull(reference, other),
            })
    }

    async fn pull_inner(
        &self,
        reference: &str,
        policy: PullPolicy,
        registry: &dyn RegistryClient,
    ) -> Result<PullOutcome> {
        let parsed = ImageReference::parse(reference)?;
        let key = parsed.full_reference();

        let existing = self.index.read().await.get(&key).cloned();
        match (policy, existing) {
            (PullPolicy::Missing, Some(image)) | (PullPolicy::Never, Some(image)) => {
                tracing::info!(
                    reference = %key,
                    digest = %image.manifest_digest,
                    "Image already present, skipping pull"
                );
                return Ok(PullOutcome::Present(image));
            }
            (PullPolicy::Never, None) => {
                return Err(BundleError::pull(
                    reference,
                    "image not present and pull policy is never",
                ));
            }
            _ => {}
        }

        tracing::info!(reference = %key, "Pulling image");
        let manifest = registry.resolve(&parsed).await?;

        let mut fetched = 0;
        let mut reused = 0;
        for blob in std::iter::once(&manifest.config).chain(manifest.layers.iter()) {
            if self.has_blob(&blob.digest) {
                tracing::debug!(digest = %blob.digest, "Blob already present");
                reused += 1;
                continue;
            }

            tracing::debug!(digest = %blob.digest, size = blob.size, "Fetching blob");
            let data = registry.fetch_blob(&parsed, blob).await?;
            self.write_blob(blob, &data)?;
            fetched += 1;
        }

        let image = StoredImage {
            reference: key.clone(),
            repo_tag: parsed.repo_tag(),
            manifest_digest: manifest.digest,
            config: manifest.config,
            layers: manifest.layers,
            pulled_at: Utc::now(),
        };

        self.index.write().await.insert(key.clone(), image.clone());
        self.save_index().await?;

        tracing::info!(
            reference = %key,
            digest = %image.manifest_digest,
            fetched,
            reused,
            "Image pulled successfully"
        );

        Ok(PullOutcome::Pulled {
            image,
            fetched,
            reused,
        })
    }

    /// Verify and store one blob.
    fn write_blob(&self, blob: &BlobDescriptor, data: &[u8]) -> Result<()> {
        let expected = digest_hex(&blob.digest)?;
        let actual = hex::encode(Sha256::digest(data));
        if actual != expected {
            return Err(BundleError::Registry {
                registry: "content".to_string(),
                message: format!(
                    "digest mismatch for {}: got sha256:{}",
                    blob.digest, actual
                ),
            });
        }

        let path = self.blob_path(&blob.digest)?;
        let dir = path.parent().unwrap_or(&self.root);
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.persist(&path).map_err(|e| BundleError::Io(e.error))?;
        Ok(())
    }

    /// Save index to disk.
    async fn save_index(&self) -> Result<()> {
        let mut images: Vec<StoredImage> = self.index.read().await.values().cloned().collect();
        images.sort_by(|a, b| a.reference.cmp(&b.reference));

        let data = serde_json::to_string_pretty(&StoreIndex { images })?;
        let index_path = self.root.join("images.json");
        tokio::fs::write(&index_path, data).await.map_err(|e| {
            BundleError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write {}: {}", index_path.display(), e),
            ))
        })?;
        Ok(())
    }
}

fn load_index(path: &Path) -> Result<HashMap<String, StoredImage>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let data = std::fs::read_to_string(path).map_err(|e| BundleError::StoreSetup {
        step: "read store index".to_string(),
        message: format!("{}: {}", path.display(), e),
    })?;
    let index: StoreIndex = serde_json::from_str(&data)?;

    Ok(index
        .images
        .into_iter()
        .map(|image| (image.reference.clone(), image))
        .collect())
}

/// Hex part of a `sha256:<hex>` digest.
fn digest_hex(digest: &str) -> Result<&str> {
    match digest.strip_prefix("sha256:") {
        Some(hex) if hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()) => Ok(hex),
        _ => Err(BundleError::Registry {
            registry: "content".to_string(),
            message: format!("unsupported digest '{}'", digest),
        }),
    }
}
