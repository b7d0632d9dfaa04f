//! Airgap Runtime - release image resolution and export.
//!
//! Turns a release version into a filtered image list, pulls those images
//! into a disposable content store, and writes them out as one
//! docker-archive tarball.
//!
//! ```text
//! version ─► ReleaseVersion ─► ManifestSource ─► RequiredImages
//!                                                     │
//!            archive.tar ◄─ DockerArchiveWriter ◄─ ContentStore ◄─ EphemeralStore
//! ```

pub mod oci;
pub mod release;
pub mod save;

// Re-export common types
pub use oci::{
    ContentStore, DockerArchiveWriter, EphemeralStore, ImageReference, PullOutcome,
    RegistryAuth, RegistryClient, RegistryPuller, StoredImage, TrustPolicy,
};
pub use release::{HttpManifestSource, ManifestSource, ReleaseVersion, RequiredImages};
pub use save::{ImageSaver, SaveReport, SaveStage};

/// Airgap Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
