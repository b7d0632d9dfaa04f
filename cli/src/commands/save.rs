//! `airgap save` command: export a release's required images.
//!
//! The version must be listed under `k3s.versions` in the configuration
//! file. The `save` section of that file overrides the pipeline defaults.

use std::path::PathBuf;

use airgap_core::{BundleError, PullPolicy, SaveConfig, ToolConfig};
use airgap_runtime::{ImageSaver, RegistryAuth, ReleaseVersion};
use clap::{Args, ValueEnum};

use crate::output::format_bytes;

#[derive(Args)]
pub struct SaveArgs {
    /// Release version (e.g., "v1.28.5+k3s1")
    pub version: String,

    /// Output archive path (e.g., "k3s-images.tar")
    pub output: PathBuf,

    /// Configuration file (default: ~/.airgap/config.yaml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// When to contact the registry for an image
    #[arg(long, value_enum)]
    pub pull_policy: Option<PolicyArg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Missing,
    Always,
    Never,
}

impl From<PolicyArg> for PullPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Missing => PullPolicy::Missing,
            PolicyArg::Always => PullPolicy::Always,
            PolicyArg::Never => PullPolicy::Never,
        }
    }
}

pub async fn execute(args: SaveArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = save_config(&args)?;
    let saver = ImageSaver::from_config(config, RegistryAuth::from_env())?;
    let report = saver.save(&args.version, &args.output).await?;

    println!(
        "Saved {} image(s) for {} to {} ({})",
        report.archive.images,
        report.version,
        report.output.display(),
        format_bytes(report.archive.size)
    );
    for tag in &report.archive.repo_tags {
        println!("  {tag}");
    }
    Ok(())
}

/// Check the requested version and build the pipeline configuration.
fn save_config(args: &SaveArgs) -> Result<SaveConfig, BundleError> {
    ReleaseVersion::parse(&args.version)?;

    let path = args.config.clone().unwrap_or_else(ToolConfig::default_path);
    let tool = ToolConfig::load(&path)?;
    tool.ensure_version(&args.version)?;

    let mut config = tool.save;
    if let Some(policy) = args.pull_policy {
        config = config.with_pull_policy(policy.into());
    }
    Ok(config)
}
