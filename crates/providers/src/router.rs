//! Provider selection: builds the configured backend.

use std::sync::Arc;
use smore_config::{AppConfig, ProviderKind};
use smore_core::provider::Provider;
use tracing::info;
use crate::ollama::OllamaProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Build the provider named by the configuration.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn Provider> {
    let base_url = config.provider.resolved_base_url();
    info!(kind = ?config.provider.kind, base_url = %base_url, model = %config.provider.model, "Using provider");

    match config.provider.kind {
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(base_url)),
        ProviderKind::Openai => {
            let api_key = config.provider.api_key.clone().unwrap_or_default();
            Arc::new(OpenAiCompatProvider::new("openai", base_url, api_key))
        }
    }
}
