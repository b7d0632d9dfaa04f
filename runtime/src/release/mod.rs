//! Release metadata: version tags, the published image list, and the
//! repository allow-list applied to it.

mod filter;
mod manifest;
mod version;

pub use filter::RequiredImages;
pub use manifest::{scan_manifest, HttpManifestSource, ManifestSource, MAX_LINE_BYTES};
pub use version::ReleaseVersion;
