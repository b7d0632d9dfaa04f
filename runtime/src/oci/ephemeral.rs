//! Disposable store for a single export.
//!
//! Every save gets a fresh temporary directory holding a trust policy and a
//! content store. The directory is removed when the [`EphemeralStore`] is
//! dropped, on success and failure alike.

use std::io::Write;
use std::path::{Path, PathBuf};

use airgap_core::error::{BundleError, Result};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use super::store::ContentStore;

/// Trust policy that accepts any image without signature checks.
pub const INSECURE_ACCEPT_ANYTHING_POLICY: &str =
    r#"{"default":[{"type":"insecureAcceptAnything"}]}"#;

const ACCEPT_ANYTHING: &str = "insecureAcceptAnything";

/// One requirement of a trust policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRequirement {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Image trust policy (`policy.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustPolicy {
    pub default: Vec<PolicyRequirement>,
}

impl TrustPolicy {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| BundleError::StoreSetup {
            step: "read policy".to_string(),
            message: format!("{}: {}", path.display(), e),
        })?;
        serde_json::from_str(&data).map_err(|e| BundleError::StoreSetup {
            step: "parse policy".to_string(),
            message: e.to_string(),
        })
    }

    /// True when every default requirement accepts unsigned content.
    pub fn accepts_anything(&self) -> bool {
        !self.default.is_empty() && self.default.iter().all(|r| r.kind == ACCEPT_ANYTHING)
    }
}

/// Temporary store directory scoped to one export.
#[derive(Debug)]
pub struct EphemeralStore {
    dir: TempDir,
}

impl EphemeralStore {
    /// Provision a store under the system temp directory.
    pub fn provision(prefix: &str) -> Result<Self> {
        Self::provision_in(&std::env::temp_dir(), prefix)
    }

    /// Provision a store under `parent`.
    pub fn provision_in(parent: &Path, prefix: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(parent)
            .map_err(|e| BundleError::StoreSetup {
                step: "create temp dir".to_string(),
                message: format!("{}: {}", parent.display(), e),
            })?;

        let policy_path = dir.path().join("policy.json");
        write_private(&policy_path, INSECURE_ACCEPT_ANYTHING_POLICY.as_bytes()).map_err(|e| {
            BundleError::StoreSetup {
                step: "write policy".to_string(),
                message: format!("{}: {}", policy_path.display(), e),
            }
        })?;

        tracing::debug!(path = %dir.path().display(), "Provisioned ephemeral store");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn policy_path(&self) -> PathBuf {
        self.dir.path().join("policy.json")
    }

    pub fn storage_path(&self) -> PathBuf {
        self.dir.path().join("storage")
    }

    pub fn trust_policy(&self) -> Result<TrustPolicy> {
        TrustPolicy::load(&self.policy_path())
    }

    /// Open the content store rooted in this directory.
    pub fn open_store(&self) -> Result<ContentStore> {
        ContentStore::open(&self.storage_path())
    }

    /// Remove the directory now, reporting any failure.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            BundleError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to remove {}: {}", path.display(), e),
            ))
        })?;
        tracing::debug!(path = %path.display(), "Removed ephemeral store");
        Ok(())
    }
}

fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}
