//! Release version validation.

use std::sync::OnceLock;

use airgap_core::error::{BundleError, Result};
use regex::Regex;

/// `v<major>.<minor>.<patch>+<suffix><build>`, e.g. `v1.28.5+k3s1`.
///
/// ASCII digits only. The suffix is alphanumeric and ends in a letter
/// followed by the build number.
const VERSION_PATTERN: &str = r"^v[0-9]+\.[0-9]+\.[0-9]+\+[A-Za-z0-9]*[A-Za-z][0-9]+$";

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(VERSION_PATTERN).expect("version pattern is valid"))
}

/// A release tag that passed validation.
///
/// Safe to embed as a URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseVersion(String);

impl ReleaseVersion {
    /// Validate a version string.
    pub fn parse(version: &str) -> Result<Self> {
        if !version_regex().is_match(version) {
            return Err(BundleError::InvalidVersion(version.to_string()));
        }
        Ok(Self(version.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for ReleaseVersion {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
