pub mod chat;
pub mod init;
pub mod memory;
pub mod serve;
pub mod tools;

use anyhow::{Context, Result};
use smore_config::AppConfig;
use smore_core::provider::Provider;
use tracing::debug;

pub(crate) fn load_config() -> Result<AppConfig> {
    AppConfig::load().context("load config")
}

/// Warn on stderr when the model backend does not answer.
pub(crate) async fn check_backend(provider: &dyn Provider) {
    match provider.health_check().await {
        Ok(true) => debug!(provider = provider.name(), "Backend reachable"),
        Ok(false) => eprintln!("  Warning: {} backend answered with an error status", provider.name()),
        Err(e) => eprintln!("  Warning: {} backend unreachable ({e})", provider.name()),
    }
}
