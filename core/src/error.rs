use thiserror::Error;

/// Airgap bundler error types
#[derive(Error, Debug)]
pub enum BundleError {
    /// Version string does not look like a release tag
    #[error("Invalid release version: {0}")]
    InvalidVersion(String),

    /// Version is not listed in the tool configuration
    #[error("Version not found in configuration: {0}")]
    UnknownVersion(String),

    /// Image reference could not be parsed
    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    /// Release manifest could not be fetched or scanned
    #[error("Fetch failed: {url} - {message}")]
    Fetch { url: String, message: String },

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Ephemeral store could not be prepared
    #[error("Store setup failed ({step}): {message}")]
    StoreSetup { step: String, message: String },

    /// An image could not be pulled into the content store
    #[error("Failed to pull {reference}: {message}")]
    Pull { reference: String, message: String },

    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    Registry { registry: String, message: String },

    /// Archive serialization error
    #[error("Export failed: {0}")]
    Export(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BundleError {
    /// Wrap any error as a pull failure for `reference`.
    pub fn pull(reference: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        BundleError::Pull {
            reference: reference.into(),
            message: cause.to_string(),
        }
    }

    /// Whether this error was raised before any I/O took place.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            BundleError::InvalidVersion(_)
                | BundleError::UnknownVersion(_)
                | BundleError::InvalidReference(_)
        )
    }
}

impl From<serde_json::Error> for BundleError {
    fn from(err: serde_json::Error) -> Self {
        BundleError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for BundleError {
    fn from(err: serde_yaml::Error) -> Self {
        BundleError::Serialization(err.to_string())
    }
}

/// Result type alias for bundler operations
pub type Result<T> = std::result::Result<T, BundleError>;
