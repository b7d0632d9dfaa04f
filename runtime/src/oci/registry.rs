//! OCI registry client for pulling images.
//!
//! Uses the `oci-distribution` crate to talk to container registries
//! (Docker Hub, GHCR, etc.). The content store only depends on the
//! [`RegistryClient`] trait, so the network side can be swapped out.

use airgap_core::error::{BundleError, Result};
use async_trait::async_trait;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::{ImageIndexEntry, OciDescriptor};
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference};
use serde::{Deserialize, Serialize};

use super::reference::ImageReference;

/// Content descriptor for a config or layer blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDescriptor {
    /// Media type (e.g., "application/vnd.oci.image.layer.v1.tar+gzip")
    pub media_type: String,
    /// Content digest ("sha256:<hex>")
    pub digest: String,
    /// Size in bytes as declared by the manifest
    pub size: u64,
}

impl From<&OciDescriptor> for BlobDescriptor {
    fn from(descriptor: &OciDescriptor) -> Self {
        Self {
            media_type: descriptor.media_type.clone(),
            digest: descriptor.digest.clone(),
            size: u64::try_from(descriptor.size).unwrap_or(0),
        }
    }
}

/// A single-platform image manifest resolved from a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedManifest {
    /// Manifest digest
    pub digest: String,
    /// Image configuration blob
    pub config: BlobDescriptor,
    /// Layer blobs, bottom to top
    pub layers: Vec<BlobDescriptor>,
}

/// Registry operations needed to materialize an image.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Resolve a reference to its image manifest for the host platform.
    async fn resolve(&self, reference: &ImageReference) -> Result<ResolvedManifest>;

    /// Download one blob of the image.
    async fn fetch_blob(&self, reference: &ImageReference, blob: &BlobDescriptor)
        -> Result<Vec<u8>>;
}

/// Environment variable holding the registry user name.
pub const USERNAME_ENV: &str = "REGISTRY_USERNAME";
/// Environment variable holding the registry password or token.
pub const PASSWORD_ENV: &str = "REGISTRY_PASSWORD";

/// Credentials presented to every registry contacted during a save.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum RegistryAuth {
    #[default]
    Anonymous,
    Basic { username: String, password: String },
}

impl RegistryAuth {
    pub fn anonymous() -> Self {
        Self::Anonymous
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Basic credentials when both variables are set and non-empty,
    /// anonymous otherwise.
    pub fn from_env() -> Self {
        Self::from_pair(
            std::env::var(USERNAME_ENV).ok(),
            std::env::var(PASSWORD_ENV).ok(),
        )
    }

    fn from_pair(username: Option<String>, password: Option<String>) -> Self {
        match (username, password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Self::basic(u, p),
            _ => Self::Anonymous,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

impl From<&RegistryAuth> for OciRegistryAuth {
    fn from(auth: &RegistryAuth) -> Self {
        match auth {
            RegistryAuth::Anonymous => OciRegistryAuth::Anonymous,
            RegistryAuth::Basic { username, password } => {
                OciRegistryAuth::Basic(username.clone(), password.clone())
            }
        }
    }
}

/// [`RegistryClient`] backed by `oci-distribution` over HTTPS.
///
/// Multi-arch indexes resolve to the linux manifest for the host CPU.
pub struct RegistryPuller {
    client: Client,
    auth: OciRegistryAuth,
}

impl RegistryPuller {
    pub fn new() -> Self {
        Self::with_auth(RegistryAuth::Anonymous)
    }

    pub fn with_auth(auth: RegistryAuth) -> Self {
        if !auth.is_anonymous() {
            tracing::debug!(auth = ?auth, "Using registry credentials");
        }
        let client = Client::new(ClientConfig {
            protocol: ClientProtocol::Https,
            platform_resolver: Some(Box::new(host_platform)),
            ..Default::default()
        });
        Self {
            client,
            auth: OciRegistryAuth::from(&auth),
        }
    }
}

impl Default for RegistryPuller {
    fn default() -> Self {
        Self::new()
    }
}

/// Pin the reference to a digest when known, otherwise to its tag.
fn oci_reference(reference: &ImageReference) -> Result<Reference> {
    let pinned = match (&reference.digest, &reference.tag) {
        (Some(digest), _) => format!("{}@{}", reference.name(), digest),
        (None, Some(tag)) => format!("{}:{}", reference.name(), tag),
        (None, None) => format!("{}:latest", reference.name()),
    };
    pinned
        .parse::<Reference>()
        .map_err(|e| BundleError::InvalidReference(format!("{}: {}", pinned, e)))
}

#[async_trait]
impl RegistryClient for RegistryPuller {
    async fn resolve(&self, reference: &ImageReference) -> Result<ResolvedManifest> {
        let target = oci_reference(reference)?;
        let (manifest, digest) = self
            .client
            .pull_image_manifest(&target, &self.auth)
            .await
            .map_err(|e| BundleError::Registry {
                registry: reference.registry.clone(),
                message: format!("manifest for {}: {}", reference, e),
            })?;

        tracing::debug!(
            reference = %reference,
            digest = %digest,
            layers = manifest.layers.len(),
            "Resolved image manifest"
        );

        Ok(ResolvedManifest {
            digest,
            config: BlobDescriptor::from(&manifest.config),
            layers: manifest.layers.iter().map(BlobDescriptor::from).collect(),
        })
    }

    async fn fetch_blob(
        &self,
        reference: &ImageReference,
        blob: &BlobDescriptor,
    ) -> Result<Vec<u8>> {
        let target = oci_reference(reference)?;
        let descriptor = OciDescriptor {
            media_type: blob.media_type.clone(),
            digest: blob.digest.clone(),
            size: i64::try_from(blob.size).unwrap_or(i64::MAX),
            ..Default::default()
        };

        let mut data = Vec::with_capacity(usize::try_from(blob.size).unwrap_or(0));
        self.client
            .pull_blob(&target, &descriptor, &mut data)
            .await
            .map_err(|e| BundleError::Registry {
                registry: reference.registry.clone(),
                message: format!("blob {}: {}", blob.digest, e),
            })?;
        Ok(data)
    }
}

/// GOARCH-style name of the host CPU.
fn host_architecture() -> &'static str {
    goarch(std::env::consts::ARCH, cfg!(target_endian = "little"))
}

fn goarch(arch: &str, little_endian: bool) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" if little_endian => "ppc64le",
        "powerpc64" => "ppc64",
        other => other,
    }
}

fn host_platform(entries: &[ImageIndexEntry]) -> Option<String> {
    select_platform(entries, "linux", host_architecture())
}

fn select_platform(entries: &[ImageIndexEntry], os: &str, architecture: &str) -> Option<String> {
    entries
        .iter()
        .find(|entry| {
            entry
                .platform
                .as_ref()
                .is_some_and(|p| p.os == os && p.architecture == architecture)
        })
        .map(|entry| entry.digest.clone())
}
