//! Docker-archive export.
//!
//! Writes stored images as a single tarball loadable with `docker load`,
//! `podman load` or `ctr images import`:
//!
//! ```text
//! archive.tar
//! ├── <config-hex>.json     image configuration, one per image
//! ├── <diff-id-hex>.tar     uncompressed layer, one per distinct layer
//! └── manifest.json         [{"Config", "RepoTags", "Layers"}, ...]
//! ```
//!
//! Entry headers are normalized so the same images always produce the
//! same bytes.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use airgap_core::error::{BundleError, Result};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::registry::BlobDescriptor;
use super::store::{ContentStore, StoredImage};

/// One entry of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchiveManifestEntry {
    pub config: String,
    pub repo_tags: Vec<String>,
    pub layers: Vec<String>,
}

/// What was written by [`DockerArchiveWriter::write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Tags exported, in archive order
    pub repo_tags: Vec<String>,
    /// Number of `manifest.json` entries
    pub images: usize,
    /// Number of distinct layers written
    pub layers: usize,
    /// Archive size in bytes
    pub size: u64,
}

/// Writes images from a [`ContentStore`] as a docker-archive.
pub struct DockerArchiveWriter<'a> {
    store: &'a ContentStore,
}

impl<'a> DockerArchiveWriter<'a> {
    pub fn new(store: &'a ContentStore) -> Self {
        Self { store }
    }

    /// Write `images` to `output`.
    ///
    /// The archive is assembled in a temporary file next to `output` and
    /// renamed into place only when complete.
    pub fn write(&self, images: &[StoredImage], output: &Path) -> Result<ArchiveSummary> {
        let parent = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| {
            BundleError::Export(format!("Failed to create {}: {}", output.display(), e))
        })?;

        let (entries, layers) = {
            let mut builder = tar::Builder::new(BufWriter::new(tmp.as_file()));
            let result = self.append_images(&mut builder, images)?;
            let mut writer = builder
                .into_inner()
                .map_err(|e| BundleError::Export(format!("Failed to finalize archive: {}", e)))?;
            writer
                .flush()
                .map_err(|e| BundleError::Export(format!("Failed to flush archive: {}", e)))?;
            result
        };

        tmp.as_file()
            .sync_all()
            .map_err(|e| BundleError::Export(format!("Failed to sync archive: {}", e)))?;
        tmp.persist(output).map_err(|e| {
            BundleError::Export(format!("Failed to write {}: {}", output.display(), e.error))
        })?;

        let size = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        Ok(ArchiveSummary {
            repo_tags: entries.iter().flat_map(|e| e.repo_tags.clone()).collect(),
            images: entries.len(),
            layers,
            size,
        })
    }

    fn append_images<W: Write>(
        &self,
        builder: &mut tar::Builder<W>,
        images: &[StoredImage],
    ) -> Result<(Vec<ArchiveManifestEntry>, usize)> {
        let mut entries: Vec<ArchiveManifestEntry> = Vec::new();
        // layer blob digest → archive path
        let mut layer_paths: HashMap<String, String> = HashMap::new();
        let mut written: HashSet<String> = HashSet::new();
        let mut seen_references: HashSet<&str> = HashSet::new();

        for image in images {
            if !seen_references.insert(image.reference.as_str()) {
                continue;
            }

            let config_name = format!("{}.json", hex_of(&image.config.digest));
            let repo_tags: Vec<String> = image.repo_tag.iter().cloned().collect();

            // Same content under another tag: merge into the existing entry
            if let Some(entry) = entries.iter_mut().find(|e| e.config == config_name) {
                for tag in repo_tags {
                    if !entry.repo_tags.contains(&tag) {
                        entry.repo_tags.push(tag);
                    }
                }
                continue;
            }

            let config = std::fs::read(self.store.blob_path(&image.config.digest)?)
                .map_err(|e| {
                    BundleError::Export(format!(
                        "Failed to read config {}: {}",
                        image.config.digest, e
                    ))
                })?;
            append_bytes(builder, &config_name, &config)?;

            let mut layer_names = Vec::with_capacity(image.layers.len());
            for layer in &image.layers {
                if let Some(name) = layer_paths.get(&layer.digest) {
                    layer_names.push(name.clone());
                    continue;
                }

                let (name, file, len) = self.uncompressed_layer(layer)?;
                if written.insert(name.clone()) {
                    append_file(builder, &name, file, len)?;
                }
                layer_paths.insert(layer.digest.clone(), name.clone());
                layer_names.push(name);
            }

            tracing::debug!(
                reference = %image.reference,
                layers = layer_names.len(),
                "Added image to archive"
            );

            entries.push(ArchiveManifestEntry {
                config: config_name,
                repo_tags,
                layers: layer_names,
            });
        }

        let manifest = serde_json::to_vec(&entries)?;
        append_bytes(builder, "manifest.json", &manifest)?;

        Ok((entries, written.len()))
    }

    /// Decompress a layer blob into a scratch file, returning its archive
    /// name (diff ID), the file rewound to the start, and its length.
    fn uncompressed_layer(&self, layer: &BlobDescriptor) -> Result<(String, File, u64)> {
        let blob = File::open(self.store.blob_path(&layer.digest)?).map_err(|e| {
            BundleError::Export(format!("Failed to open layer {}: {}", layer.digest, e))
        })?;

        let mut reader: Box<dyn Read> = if layer.media_type.ends_with("gzip") {
            Box::new(GzDecoder::new(blob))
        } else if layer.media_type.ends_with("tar") {
            Box::new(blob)
        } else {
            return Err(BundleError::Export(format!(
                "Unsupported layer media type {} for {}",
                layer.media_type, layer.digest
            )));
        };

        let scratch = tempfile::tempfile_in(self.store.root()).map_err(|e| {
            BundleError::Export(format!("Failed to create scratch file: {}", e))
        })?;
        let mut hashing = HashingWriter::new(scratch);
        let len = std::io::copy(&mut reader, &mut hashing).map_err(|e| {
            BundleError::Export(format!("Failed to decompress layer {}: {}", layer.digest, e))
        })?;
        let (mut file, diff_id) = hashing.finish();
        file.seek(SeekFrom::Start(0))?;

        Ok((format!("{}.tar", diff_id), file, len))
    }
}

fn hex_of(digest: &str) -> &str {
    digest.strip_prefix("sha256:").unwrap_or(digest)
}

fn entry_header(size: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(size);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

fn append_bytes<W: Write>(builder: &mut tar::Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = entry_header(data.len() as u64);
    builder
        .append_data(&mut header, name, data)
        .map_err(|e| BundleError::Export(format!("Failed to append {}: {}", name, e)))
}

fn append_file<W: Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    file: File,
    len: u64,
) -> Result<()> {
    let mut header = entry_header(len);
    builder
        .append_data(&mut header, name, file)
        .map_err(|e| BundleError::Export(format!("Failed to append {}: {}", name, e)))
}

/// Writer that hashes everything passing through it.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> (W, String) {
        (self.inner, hex::encode(self.hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::store::tests::{sha256, FakeRegistry};
    use airgap_core::config::PullPolicy;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    const GZIP_LAYER: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
    const TAR_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";

    fn layer_tar(file_name: &str, contents: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, file_name, contents).unwrap();
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn read_archive(path: &Path) -> HashMap<String, Vec<u8>> {
        let mut archive = tar::Archive::new(File::open(path).unwrap());
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().to_string_lossy().to_string();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                (name, data)
            })
            .collect()
    }

    async fn pulled(
        store: &ContentStore,
        registry: &FakeRegistry,
        refs: &[&str],
    ) -> Vec<StoredImage> {
        let mut images = Vec::new();
        for r in refs {
            let outcome = store.pull(r, PullPolicy::Missing, registry).await.unwrap();
            images.push(outcome.into_image());
        }
        images
    }

    #[tokio::test]
    async fn test_write_docker_archive() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(&tmp.path().join("store")).unwrap();
        let base = layer_tar("etc/os-release", b"ID=test");
        let mut registry = FakeRegistry::default();
        registry.add_image(
            "docker.io/rancher/mirrored-pause:3.9",
            br#"{"architecture":"amd64"}"#,
            &[(GZIP_LAYER, gzip(&base)), (TAR_LAYER, layer_tar("pause", b"bin"))],
        );

        let images = pulled(&store, &registry, &["docker.io/rancher/mirrored-pause:3.9"]).await;
        let output = tmp.path().join("out.tar");
        let summary = DockerArchiveWriter::new(&store).write(&images, &output).unwrap();

        assert_eq!(summary.images, 1);
        assert_eq!(summary.layers, 2);
        assert_eq!(summary.repo_tags, vec!["docker.io/rancher/mirrored-pause:3.9"]);
        assert!(summary.size > 0);

        let files = read_archive(&output);
        let manifest: Vec<ArchiveManifestEntry> =
            serde_json::from_slice(&files["manifest.json"]).unwrap();
        assert_eq!(manifest.len(), 1);
        let entry = &manifest[0];
        assert_eq!(entry.repo_tags, vec!["docker.io/rancher/mirrored-pause:3.9"]);
        assert_eq!(
            files[&entry.config],
            br#"{"architecture":"amd64"}"#.to_vec()
        );

        // Layers are stored uncompressed and named by their diff ID
        let base_name = format!("{}.tar", hex_of(&sha256(&base)));
        assert_eq!(entry.layers[0], base_name);
        assert_eq!(files[&base_name], base);
        assert_eq!(entry.layers.len(), 2);
    }

    #[tokio::test]
    async fn test_shared_layer_written_once() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(&tmp.path().join("store")).unwrap();
        let base = gzip(&layer_tar("base", b"shared"));
        let mut registry = FakeRegistry::default();
        registry.add_image(
            "docker.io/rancher/mirrored-pause:3.9",
            br#"{"id":1}"#,
            &[(GZIP_LAYER, base.clone())],
        );
        registry.add_image(
            "docker.io/rancher/mirrored-coredns-coredns:1.11",
            br#"{"id":2}"#,
            &[(GZIP_LAYER, base), (TAR_LAYER, layer_tar("coredns", b"dns"))],
        );

        let images = pulled(
            &store,
            &registry,
            &[
                "docker.io/rancher/mirrored-pause:3.9",
                "docker.io/rancher/mirrored-coredns-coredns:1.11",
            ],
        )
        .await;
        let output = tmp.path().join("out.tar");
        let summary = DockerArchiveWriter::new(&store).write(&images, &output).unwrap();

        assert_eq!(summary.images, 2);
        assert_eq!(summary.layers, 2);
        let files = read_archive(&output);
        // two configs, two layers, manifest.json
        assert_eq!(files.len(), 5);
    }

    #[tokio::test]
    async fn test_duplicate_references_collapse() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(&tmp.path().join("store")).unwrap();
        let mut registry = FakeRegistry::default();
        registry.add_image(
            "docker.io/rancher/mirrored-pause:3.9",
            br#"{}"#,
            &[(TAR_LAYER, layer_tar("pause", b"bin"))],
        );

        let images = pulled(
            &store,
            &registry,
            &[
                "docker.io/rancher/mirrored-pause:3.9",
                "docker.io/rancher/mirrored-pause:3.9",
            ],
        )
        .await;
        let output = tmp.path().join("out.tar");
        let summary = DockerArchiveWriter::new(&store).write(&images, &output).unwrap();
        assert_eq!(summary.images, 1);
        assert_eq!(summary.repo_tags.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_image_list() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(&tmp.path().join("store")).unwrap();
        let output = tmp.path().join("empty.tar");

        let summary = DockerArchiveWriter::new(&store).write(&[], &output).unwrap();
        assert_eq!(summary.images, 0);
        assert_eq!(summary.layers, 0);

        let files = read_archive(&output);
        assert_eq!(files.len(), 1);
        assert_eq!(files["manifest.json"], b"[]".to_vec());
    }

    #[tokio::test]
    async fn test_output_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(&tmp.path().join("store")).unwrap();
        let mut registry = FakeRegistry::default();
        registry.add_image(
            "docker.io/rancher/mirrored-pause:3.9",
            br#"{}"#,
            &[(GZIP_LAYER, gzip(&layer_tar("pause", b"bin")))],
        );
        let images = pulled(&store, &registry, &["docker.io/rancher/mirrored-pause:3.9"]).await;

        let writer = DockerArchiveWriter::new(&store);
        let first = tmp.path().join("a.tar");
        let second = tmp.path().join("b.tar");
        writer.write(&images, &first).unwrap();
        writer.write(&images, &second).unwrap();
        assert_eq!(std::fs::read(first).unwrap(), std::fs::read(second).unwrap());
    }

    #[tokio::test]
    async fn test_unsupported_media_type() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(&tmp.path().join("store")).unwrap();
        let mut registry = FakeRegistry::default();
        registry.add_image(
            "docker.io/rancher/mirrored-pause:3.9",
            br#"{}"#,
            &[("application/vnd.oci.image.layer.v1.tar+zstd", b"zstd".to_vec())],
        );
        let images = pulled(&store, &registry, &["docker.io/rancher/mirrored-pause:3.9"]).await;

        let output = tmp.path().join("out.tar");
        let err = DockerArchiveWriter::new(&store).write(&images, &output).unwrap_err();
        assert!(matches!(err, BundleError::Export(_)));
        assert!(!output.exists());
    }

    #[test]
    fn test_write_to_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(&tmp.path().join("store")).unwrap();
        let output = tmp.path().join("missing").join("out.tar");
        let err = DockerArchiveWriter::new(&store).write(&[], &output).unwrap_err();
        assert!(matches!(err, BundleError::Export(_)));
    }
}
