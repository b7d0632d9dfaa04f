//! Release manifest retrieval.
//!
//! Each release publishes a plain-text list of fully qualified image
//! references as a release asset. The fetch is a single bounded GET: one
//! request, a hard deadline, and a byte ceiling on what gets scanned.

use std::time::Duration;

use airgap_core::config::SaveConfig;
use airgap_core::error::{BundleError, Result};
use async_trait::async_trait;

use super::version::ReleaseVersion;

/// Scanner buffer size. A line and its `\n` must fit, so the longest line
/// accepted is one byte shorter.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Source of a release's image list.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetch the manifest for `version` as individual lines.
    async fn fetch(&self, version: &ReleaseVersion) -> Result<Vec<String>>;
}

/// Fetches `<base>/<version>/<asset>` over HTTP(S).
pub struct HttpManifestSource {
    client: reqwest::Client,
    base_url: String,
    asset: String,
    max_bytes: usize,
    timeout: Duration,
}

impl HttpManifestSource {
    /// Create a manifest source from the pipeline configuration.
    pub fn new(config: &SaveConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BundleError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.release_base_url.trim_end_matches('/').to_string(),
            asset: config.manifest_asset.clone(),
            max_bytes: usize::try_from(config.max_manifest_bytes).unwrap_or(usize::MAX),
            timeout: config.request_timeout,
        })
    }

    /// Manifest URL for a validated version.
    pub fn manifest_url(&self, version: &ReleaseVersion) -> String {
        format!("{}/{}/{}", self.base_url, version, self.asset)
    }

    fn request_error(&self, url: &str, err: reqwest::Error) -> BundleError {
        if err.is_timeout() {
            BundleError::Timeout(format!("{} did not complete within {:?}", url, self.timeout))
        } else {
            BundleError::Fetch {
                url: url.to_string(),
                message: format!("request unsuccessful: {}", err),
            }
        }
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch(&self, version: &ReleaseVersion) -> Result<Vec<String>> {
        let url = self.manifest_url(version);
        let deadline = tokio::time::Instant::now() + self.timeout;

        tracing::info!(url = %url, "Fetching release manifest");

        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.request_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BundleError::Fetch {
                url,
                message: format!("unexpected status {}", status),
            });
        }

        let mut body: Vec<u8> = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.request_error(&url, e))?
        {
            let room = self.max_bytes - body.len();
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        if truncated {
            tracing::warn!(
                url = %url,
                limit = self.max_bytes,
                "Release manifest exceeds size limit, ignoring the rest"
            );
        }

        let scanned = scan_manifest(&body, truncated);

        // Discard whatever the server still sends so the connection can be reused
        if truncated {
            let _ = tokio::time::timeout_at(deadline, async {
                while let Ok(Some(_)) = response.chunk().await {}
            })
            .await;
        }

        let lines = scanned.map_err(|e| BundleError::Fetch {
            url: url.clone(),
            message: format!("error processing {}: {}", self.asset, e),
        })?;

        tracing::debug!(url = %url, lines = lines.len(), "Release manifest scanned");
        Ok(lines)
    }
}

/// Split a manifest body into lines.
///
/// Lines end at `\n`, with one trailing `\r` removed. A final line without a
/// terminator is kept when the body is complete and dropped when `truncated`
/// is set, since it was cut off by the size limit. Any line, cut off or not,
/// that cannot fit in [`MAX_LINE_BYTES`] with its terminator is an error.
pub fn scan_manifest(body: &[u8], truncated: bool) -> std::io::Result<Vec<String>> {
    let mut lines = Vec::new();
    let mut rest = body;

    loop {
        let (line, next) = match rest.iter().position(|&b| b == b'\n') {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
            None => (rest, None),
        };

        if line.len() + 1 > MAX_LINE_BYTES {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "token too long",
            ));
        }

        if next.is_none() && (line.is_empty() || truncated) {
            break;
        }

        let line = line.strip_suffix(b"\r").unwrap_or(line);
        lines.push(String::from_utf8_lossy(line).into_owned());

        match next {
            Some(next) => rest = next,
            None => break,
        }
    }

    Ok(lines)
}
