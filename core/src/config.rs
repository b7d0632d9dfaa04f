use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BundleError, Result};

/// Repositories exported into every airgap archive.
pub const DEFAULT_REQUIRED_IMAGES: &[&str] = &[
    "docker.io/rancher/mirrored-pause",
    "docker.io/rancher/mirrored-coredns-coredns",
];

/// Upper bound on the release manifest body: 1 MiB.
pub const DEFAULT_MAX_MANIFEST_BYTES: u64 = 1 << 20;

/// Wall-clock bound on the release manifest request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Release asset download prefix; the version is appended as a path segment.
pub const DEFAULT_RELEASE_BASE_URL: &str = "https://github.com/k3s-io/k3s/releases/download";

/// Image list published alongside each release.
pub const DEFAULT_MANIFEST_ASSET: &str = "k3s-images.txt";

/// When to contact the registry for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullPolicy {
    /// Pull only images not already in the store
    #[default]
    Missing,
    /// Always resolve the manifest again, reusing blobs already stored
    Always,
    /// Never contact the registry; fail on absent images
    Never,
}

/// Pipeline configuration for a single save run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Repository names (reference up to the first `:`) to export
    pub required_images: Vec<String>,

    /// Maximum manifest bytes scanned
    pub max_manifest_bytes: u64,

    /// Manifest request timeout
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Release download base URL
    pub release_base_url: String,

    /// Manifest asset file name
    pub manifest_asset: String,

    /// Pull policy for each image
    pub pull_policy: PullPolicy,

    /// Prefix of the ephemeral store directory name
    pub temp_prefix: String,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            required_images: DEFAULT_REQUIRED_IMAGES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_manifest_bytes: DEFAULT_MAX_MANIFEST_BYTES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            release_base_url: DEFAULT_RELEASE_BASE_URL.to_string(),
            manifest_asset: DEFAULT_MANIFEST_ASSET.to_string(),
            pull_policy: PullPolicy::Missing,
            temp_prefix: "airgap-".to_string(),
        }
    }
}

impl SaveConfig {
    pub fn with_required_images<I, S>(mut self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_images = images.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_manifest_bytes(mut self, bytes: u64) -> Self {
        self.max_manifest_bytes = bytes;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_release_base_url(mut self, url: impl Into<String>) -> Self {
        self.release_base_url = url.into();
        self
    }

    pub fn with_pull_policy(mut self, policy: PullPolicy) -> Self {
        self.pull_policy = policy;
        self
    }

    /// Manifest URL for a (validated) version string.
    pub fn manifest_url(&self, version: &str) -> String {
        format!(
            "{}/{}/{}",
            self.release_base_url.trim_end_matches('/'),
            version,
            self.manifest_asset
        )
    }
}

/// Per-version entry in the tool configuration.
///
/// Only presence is checked; any keys are accepted and kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Distribution section of the tool configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// Supported release versions
    pub versions: BTreeMap<String, VersionEntry>,
}

/// Tool configuration file (`~/.airgap/config.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub k3s: DistributionConfig,

    /// Overrides for the save pipeline
    pub save: SaveConfig,
}

impl ToolConfig {
    /// Default configuration path (~/.airgap/config.yaml).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".airgap"))
            .unwrap_or_else(|| PathBuf::from(".airgap"))
            .join("config.yaml")
    }

    /// Load the configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            BundleError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: ToolConfig = serde_yaml::from_str(&data).map_err(|e| {
            BundleError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        tracing::debug!(
            path = %path.display(),
            versions = config.k3s.versions.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Fail unless `version` is listed under `k3s.versions`.
    pub fn ensure_version(&self, version: &str) -> Result<&VersionEntry> {
        self.k3s
            .versions
            .get(version)
            .ok_or_else(|| BundleError::UnknownVersion(version.to_string()))
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
