//! `airgap` binary.

use std::process::ExitCode;

use clap::Parser;

use airgap_cli::commands::{dispatch, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    airgap_cli::logging::init();

    match dispatch(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
