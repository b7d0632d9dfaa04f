//! Airgap CLI - export a release's required images for offline installs.

pub mod commands;
pub mod logging;
pub mod output;
