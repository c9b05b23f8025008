//! Long-term memory store implementations for Smore.

pub mod noop;
pub mod in_memory;
pub mod file_backend;

pub use noop::NoopStore;
pub use in_memory::InMemoryStore;
pub use file_backend::FileStore;

use smore_config::MemoryConfig;
use smore_core::memory::MemoryStore;
use std::sync::Arc;

/// Build the store named by the configuration.
pub fn build_from_config(config: &MemoryConfig) -> Arc<dyn MemoryStore> {
    match config.backend.as_str() {
        "none" => Arc::new(NoopStore),
        "in_memory" => Arc::new(InMemoryStore::new().with_max_chars(config.max_chars)),
        _ => Arc::new(FileStore::new(config.resolved_path()).with_max_chars(config.max_chars)),
    }
}
