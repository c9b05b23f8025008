//! Language-model provider implementations for Smore.
//!
//! All providers implement the `smore_core::Provider` trait.
//! `build_from_config` selects the backend named in the configuration.

mod http;
pub mod ollama;
pub mod openai_compat;
pub mod router;

pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;
