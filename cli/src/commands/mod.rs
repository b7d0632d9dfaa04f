//! CLI command definitions and dispatch.

mod save;
mod version;

use clap::{Parser, Subcommand};

/// Airgap image bundler.
#[derive(Parser)]
#[command(name = "airgap", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Export a release's required images to a docker-archive tarball
    Save(save::SaveArgs),
    /// Show version information
    Version(version::VersionArgs),
}

pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Save(args) => save::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_save() {
        let cli = Cli::try_parse_from([
            "airgap",
            "save",
            "v1.28.5+k3s1",
            "/tmp/k3s-images.tar",
            "--config",
            "/etc/airgap.yaml",
        ])
        .unwrap();

        match cli.command {
            Command::Save(args) => {
                assert_eq!(args.version, "v1.28.5+k3s1");
                assert_eq!(args.output.to_str(), Some("/tmp/k3s-images.tar"));
                assert_eq!(
                    args.config.as_deref().and_then(|p| p.to_str()),
                    Some("/etc/airgap.yaml")
                );
                assert!(args.pull_policy.is_none());
            }
            _ => panic!("expected save"),
        }
    }

    #[test]
    fn test_parse_save_requires_output() {
        assert!(Cli::try_parse_from(["airgap", "save", "v1.28.5+k3s1"]).is_err());
    }

    #[test]
    fn test_parse_pull_policy() {
        let cli = Cli::try_parse_from([
            "airgap",
            "save",
            "v1.28.5+k3s1",
            "out.tar",
            "--pull-policy",
            "always",
        ])
        .unwrap();
        match cli.command {
            Command::Save(args) => {
                assert_eq!(args.pull_policy, Some(save::PolicyArg::Always))
            }
            _ => panic!("expected save"),
        }

        assert!(Cli::try_parse_from([
            "airgap",
            "save",
            "v1.28.5+k3s1",
            "out.tar",
            "--pull-policy",
            "sometimes",
        ])
        .is_err());
    }

    #[test]
    fn test_parse_version() {
        let cli = Cli::try_parse_from(["airgap", "version"]).unwrap();
        assert!(matches!(cli.command, Command::Version(_)));
    }
}
