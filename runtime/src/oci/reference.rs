//! Image reference parsing.
//!
//! Manifest lines such as `docker.io/rancher/mirrored-pause:3.9` are parsed
//! into registry, repository, tag and digest before they are pulled.

use airgap_core::error::{BundleError, Result};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Registry hostname (e.g., "docker.io", "registry.k8s.io:443")
    pub registry: String,
    /// Repository path (e.g., "rancher/mirrored-pause")
    pub repository: String,
    /// Tag (e.g., "3.9")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `rancher/mirrored-pause:3.9` → docker.io/rancher/mirrored-pause:3.9
    /// - `registry.k8s.io:5000/pause:3.9` → registry.k8s.io:5000/pause:3.9
    /// - `ghcr.io/org/image@sha256:abc...` keeps the digest and no tag
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(BundleError::InvalidReference(
                "empty image reference".to_string(),
            ));
        }

        let (name_tag, digest) = match reference.rfind('@') {
            Some(at) => {
                let digest = &reference[at + 1..];
                if !digest.contains(':') {
                    return Err(BundleError::InvalidReference(format!(
                        "'{}': digest must be algorithm:hex",
                        reference
                    )));
                }
                (&reference[..at], Some(digest.to_string()))
            }
            None => (reference, None),
        };

        let (name, tag) = split_tag(name_tag);
        let (registry, repository) = split_registry(name)?;

        let tag = match (tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (tag, _) => tag.map(str::to_string),
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// `registry/repository`, without tag or digest.
    pub fn name(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// `registry/repository:tag`, if the reference carries a tag.
    pub fn repo_tag(&self) -> Option<String> {
        self.tag.as_ref().map(|tag| format!("{}:{}", self.name(), tag))
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = self.name();
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

/// Split `name[:tag]`, where the tag colon must follow the last `/`.
fn split_tag(name_tag: &str) -> (&str, Option<&str>) {
    let last_segment = name_tag.rfind('/').map(|p| p + 1).unwrap_or(0);
    match name_tag[last_segment..].rfind(':') {
        Some(colon) => {
            let colon = last_segment + colon;
            let after = &name_tag[colon + 1..];
            // `localhost:5000` with no path is a registry port, not a tag
            if last_segment == 0 && after.chars().all(|c| c.is_ascii_digit()) {
                (name_tag, None)
            } else {
                (&name_tag[..colon], Some(after))
            }
        }
        None => (name_tag, None),
    }
}

/// Split a name into registry and repository components.
fn split_registry(name: &str) -> Result<(String, String)> {
    if let Some(slash) = name.find('/') {
        let first = &name[..slash];
        if first.contains('.') || first.contains(':') || first == "localhost" {
            let repository = &name[slash + 1..];
            if repository.is_empty() {
                return Err(BundleError::InvalidReference(format!(
                    "'{}': empty repository",
                    name
                )));
            }
            return Ok((first.to_string(), repository.to_string()));
        }
    }

    let repository = if name.contains('/') {
        name.to_string()
    } else {
        format!("library/{}", name)
    };
    Ok((DEFAULT_REGISTRY.to_string(), repository))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest_line() {
        let r = ImageReference::parse("docker.io/rancher/mirrored-pause:3.9").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "rancher/mirrored-pause");
        assert_eq!(r.tag, Some("3.9".to_string()));
        assert_eq!(r.digest, None);
    }

    #[test]
    fn test_parse_simple_name() {
        let r = ImageReference::parse("nginx").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "library/nginx");
        assert_eq!(r.tag, Some("latest".to_string()));
    }

    #[test]
    fn test_parse_user_repo_with_tag() {
        let r = ImageReference::parse("rancher/klipper-lb:v0.4.4").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "rancher/klipper-lb");
        assert_eq!(r.tag, Some("v0.4.4".to_string()));
    }

    #[test]
    fn test_parse_registry_with_port() {
        let r = ImageReference::parse("myregistry.io:5000/pause:3.9").unwrap();
        assert_eq!(r.registry, "myregistry.io:5000");
        assert_eq!(r.repository, "pause");
        assert_eq!(r.tag, Some("3.9".to_string()));
    }

    #[test]
    fn test_parse_digest_only() {
        let r = ImageReference::parse("ghcr.io/org/image@sha256:abcdef").unwrap();
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.repository, "org/image");
        assert_eq!(r.tag, None);
        assert_eq!(r.digest, Some("sha256:abcdef".to_string()));
        assert_eq!(r.repo_tag(), None);
    }

    #[test]
    fn test_parse_tag_and_digest() {
        let r = ImageReference::parse("ghcr.io/org/image:v1@sha256:abcdef").unwrap();
        assert_eq!(r.tag, Some("v1".to_string()));
        assert_eq!(r.digest, Some("sha256:abcdef".to_string()));
        assert_eq!(r.full_reference(), "ghcr.io/org/image:v1@sha256:abcdef");
    }

    #[test]
    fn test_parse_localhost_registry() {
        let r = ImageReference::parse("localhost/myimage:test").unwrap();
        assert_eq!(r.registry, "localhost");
        assert_eq!(r.repository, "myimage");
    }

    #[test]
    fn test_parse_errors() {
        assert!(ImageReference::parse("").is_err());
        assert!(ImageReference::parse("   ").is_err());
        assert!(ImageReference::parse("nginx@invaliddigest").is_err());
        assert!(ImageReference::parse("ghcr.io/").is_err());
    }

    #[test]
    fn test_repo_tag_and_display() {
        let r = ImageReference::parse("docker.io/rancher/mirrored-coredns-coredns:1.11").unwrap();
        assert_eq!(r.name(), "docker.io/rancher/mirrored-coredns-coredns");
        assert_eq!(
            r.repo_tag(),
            Some("docker.io/rancher/mirrored-coredns-coredns:1.11".to_string())
        );
        assert_eq!(r.to_string(), "docker.io/rancher/mirrored-coredns-coredns:1.11");
    }
}
