//! Repository allow-list applied to a release manifest.

use std::collections::HashSet;

use airgap_core::config::SaveConfig;

/// Set of repository names that belong in the archive.
#[derive(Debug, Clone, Default)]
pub struct RequiredImages {
    repositories: HashSet<String>,
}

impl RequiredImages {
    pub fn new<I, S>(repositories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            repositories: repositories.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &SaveConfig) -> Self {
        Self::new(config.required_images.iter().cloned())
    }

    pub fn contains(&self, repository: &str) -> bool {
        self.repositories.contains(repository)
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    /// Keep the lines whose repository (text before the first `:`) is required.
    ///
    /// Manifest order and duplicates are preserved.
    pub fn filter<I, S>(&self, lines: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines
            .into_iter()
            .filter(|line| self.matches(line.as_ref()))
            .map(|line| line.as_ref().to_string())
            .collect()
    }

    fn matches(&self, line: &str) -> bool {
        let repository = line.split(':').next().unwrap_or(line);
        self.contains(repository)
    }
}
