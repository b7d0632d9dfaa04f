//! Integration test: drive the `airgap` binary end to end.
//!
//! The offline tests check argument and configuration handling. The
//! `#[ignore]` test downloads a real release manifest and pulls the
//! required images from Docker Hub.
//!
//! ## Running
//!
//! ```bash
//! # Offline tests
//! cargo test -p airgap-cli --test save_integration
//!
//! # Including the network test
//! cargo test -p airgap-cli --test save_integration -- --ignored --nocapture
//! ```

use std::path::Path;
use std::process::{Command, Output};

const VERSION: &str = "v1.28.5+k3s1";

fn airgap(args: &[&str]) -> Output {
    eprintln!("    $ airgap {}", args.join(" "));
    Command::new(env!("CARGO_BIN_EXE_airgap"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run airgap binary")
}

fn write_config(dir: &Path) -> String {
    let path = dir.join("config.yaml");
    std::fs::write(
        &path,
        format!("k3s:\n  versions:\n    {VERSION}: {{}}\n"),
    )
    .unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn test_version_command() {
    let out = airgap(&["version"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("airgap version "), "{stdout}");
}

#[test]
fn test_malformed_version_exits_with_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let output = dir.path().join("out.tar");
    let out = airgap(&["save", "1.28.5", output.to_str().unwrap()]);

    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Error: Invalid release version: 1.28.5"), "{stderr}");
    assert!(!output.exists());
}

#[test]
fn test_unlisted_version_exits_with_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = write_config(dir.path());
    let output = dir.path().join("out.tar");
    let out = airgap(&[
        "save",
        "v1.20.0+k3s1",
        output.to_str().unwrap(),
        "--config",
        &config,
    ]);

    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Version not found in configuration: v1.20.0+k3s1"), "{stderr}");
    assert!(!output.exists());
}

#[test]
#[ignore] // Requires network access to GitHub and Docker Hub
fn test_save_release_images() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = write_config(dir.path());
    let output = dir.path().join("k3s-images.tar");
    let out = airgap(&["save", VERSION, output.to_str().unwrap(), "--config", &config]);

    assert!(
        out.status.success(),
        "{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("mirrored-pause"), "{stdout}");
    assert!(stdout.contains("mirrored-coredns-coredns"), "{stdout}");

    let mut archive = tar::Archive::new(std::fs::File::open(&output).unwrap());
    let names: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
        .collect();
    assert!(names.iter().any(|n| n == "manifest.json"));
}
