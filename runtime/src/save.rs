//! Release image export pipeline.
//!
//! `version → manifest → filtered images → ephemeral store → pulls → archive`
//!
//! Runs sequentially on the calling task. The ephemeral store is created
//! after the image list is known and removed before `save` returns, whatever
//! the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use airgap_core::config::SaveConfig;
use airgap_core::error::{BundleError, Result};

use crate::oci::{
    ArchiveSummary, DockerArchiveWriter, EphemeralStore, RegistryAuth, RegistryClient,
    RegistryPuller,
};
use crate::release::{HttpManifestSource, ManifestSource, ReleaseVersion, RequiredImages};

/// Progress of a save run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStage {
    Idle,
    Validated,
    Fetched,
    Filtered,
    StoreReady,
    Pulling,
    Exporting,
    Done,
}

impl std::fmt::Display for SaveStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SaveStage::Idle => "idle",
            SaveStage::Validated => "validated",
            SaveStage::Fetched => "fetched",
            SaveStage::Filtered => "filtered",
            SaveStage::StoreReady => "store-ready",
            SaveStage::Pulling => "pulling",
            SaveStage::Exporting => "exporting",
            SaveStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Result of a successful save.
#[derive(Debug, Clone)]
pub struct SaveReport {
    pub version: ReleaseVersion,
    /// Filtered image references, in manifest order
    pub images: Vec<String>,
    pub output: PathBuf,
    pub archive: ArchiveSummary,
}

/// Exports a release's required images into one archive.
pub struct ImageSaver {
    config: SaveConfig,
    required: RequiredImages,
    manifests: Box<dyn ManifestSource>,
    registry: Arc<dyn RegistryClient>,
    temp_root: Option<PathBuf>,
}

impl ImageSaver {
    pub fn new(
        config: SaveConfig,
        manifests: Box<dyn ManifestSource>,
        registry: Arc<dyn RegistryClient>,
    ) -> Self {
        let required = RequiredImages::from_config(&config);
        Self {
            config,
            required,
            manifests,
            registry,
            temp_root: None,
        }
    }

    /// Saver backed by the release download site and real registries.
    pub fn from_config(config: SaveConfig, auth: RegistryAuth) -> Result<Self> {
        let manifests = HttpManifestSource::new(&config)?;
        Ok(Self::new(
            config,
            Box::new(manifests),
            Arc::new(RegistryPuller::with_auth(auth)),
        ))
    }

    /// Create ephemeral stores under `dir` instead of the system temp directory.
    pub fn with_temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(dir.into());
        self
    }

    pub fn config(&self) -> &SaveConfig {
        &self.config
    }

    /// Validate `version`, fetch its manifest and return the required images.
    pub async fn resolve_images(&self, version: &str) -> Result<(ReleaseVersion, Vec<String>)> {
        let mut stage = SaveStage::Idle;
        self.resolve(version, &mut stage).await
    }

    /// Export the required images of `version` to `output`.
    pub async fn save(&self, version: &str, output: &Path) -> Result<SaveReport> {
        let mut stage = SaveStage::Idle;
        let result = self.run(version, output, &mut stage).await;
        if let Err(ref e) = result {
            tracing::error!(version, stage = %stage, error = %e, "Save failed");
        }
        result
    }

    async fn run(&self, version: &str, output: &Path, stage: &mut SaveStage) -> Result<SaveReport> {
        let (version, images) = self.resolve(version, stage).await?;

        let ephemeral = self.provision()?;
        advance(stage, SaveStage::StoreReady);

        let exported = self.pull_and_export(&ephemeral, &images, output, stage).await;
        if let Err(e) = ephemeral.close() {
            tracing::warn!(error = %e, "Failed to remove ephemeral store");
        }
        let archive = exported?;

        advance(stage, SaveStage::Done);
        tracing::info!(
            version = %version,
            output = %output.display(),
            images = archive.images,
            size = archive.size,
            "Archive written"
        );

        Ok(SaveReport {
            version,
            images,
            output: output.to_path_buf(),
            archive,
        })
    }

    async fn resolve(
        &self,
        version: &str,
        stage: &mut SaveStage,
    ) -> Result<(ReleaseVersion, Vec<String>)> {
        let version = ReleaseVersion::parse(version)?;
        advance(stage, SaveStage::Validated);

        let lines = self.manifests.fetch(&version).await?;
        advance(stage, SaveStage::Fetched);

        let images = self.required.filter(&lines);
        advance(stage, SaveStage::Filtered);

        if images.is_empty() {
            tracing::warn!(
                version = %version,
                lines = lines.len(),
                "No required images found in release manifest"
            );
        } else {
            tracing::info!(version = %version, images = ?images, "Resolved required images");
        }

        Ok((version, images))
    }

    fn provision(&self) -> Result<EphemeralStore> {
        match &self.temp_root {
            Some(root) => EphemeralStore::provision_in(root, &self.config.temp_prefix),
            None => EphemeralStore::provision(&self.config.temp_prefix),
        }
    }

    async fn pull_and_export(
        &self,
        ephemeral: &EphemeralStore,
        images: &[String],
        output: &Path,
        stage: &mut SaveStage,
    ) -> Result<ArchiveSummary> {
        let policy = ephemeral.trust_policy()?;
        if !policy.accepts_anything() {
            return Err(BundleError::StoreSetup {
                step: "check policy".to_string(),
                message: "signature verification is not supported".to_string(),
            });
        }
        let store = ephemeral.open_store()?;

        advance(stage, SaveStage::Pulling);
        let mut pulled = Vec::with_capacity(images.len());
        for (i, reference) in images.iter().enumerate() {
            tracing::info!(
                reference = %reference,
                index = i + 1,
                total = images.len(),
                "Pulling image"
            );
            let outcome = store
                .pull(reference, self.config.pull_policy, self.registry.as_ref())
                .await?;
            pulled.push(outcome.into_image());
        }

        advance(stage, SaveStage::Exporting);
        DockerArchiveWriter::new(&store).write(&pulled, output)
    }
}

fn advance(stage: &mut SaveStage, next: SaveStage) {
    tracing::debug!(from = %stage, to = %next, "Save stage");
    *stage = next;
}
