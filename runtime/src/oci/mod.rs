//! OCI image handling: references, registry pulls, the content store, and
//! docker-archive export.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  <tmp>/airgap-XXXXXX/          (EphemeralStore)           │
//! │  ├── policy.json               (insecureAcceptAnything)   │
//! │  └── storage/                  (ContentStore)             │
//! │      ├── images.json           (reference → StoredImage)  │
//! │      └── blobs/sha256/<hex>    (configs and layers)       │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod archive;
pub mod ephemeral;
pub mod reference;
pub mod registry;
pub mod store;

pub use archive::{ArchiveManifestEntry, ArchiveSummary, DockerArchiveWriter};
pub use ephemeral::{EphemeralStore, TrustPolicy, INSECURE_ACCEPT_ANYTHING_POLICY};
pub use reference::ImageReference;
pub use registry::{BlobDescriptor, RegistryAuth, RegistryClient, RegistryPuller, ResolvedManifest};
pub use store::{ContentStore, PullOutcome, StoredImage};
