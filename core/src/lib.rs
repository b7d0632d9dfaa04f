//! Airgap Core - Foundational Types
//!
//! Error taxonomy and configuration shared by the runtime pipeline and the CLI.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{PullPolicy, SaveConfig, ToolConfig, VersionEntry};
pub use error::{BundleError, Result};

/// Airgap bundler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
