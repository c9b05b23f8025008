//! No-op memory store: disables long-term notes entirely.

use async_trait::async_trait;
use smore_core::error::MemoryError;
use smore_core::memory::{check_size, MemoryStore, WriteOutcome, DEFAULT_MAX_CHARS};

/// A store that remembers nothing. Writes are accepted and discarded.
pub struct NoopStore;

#[async_trait]
impl MemoryStore for NoopStore {
    fn name(&self) -> &str { "none" }

    async fn read(&self) -> Result<String, MemoryError> {
        Ok(String::new())
    }

    async fn write(&self, content: &str) -> Result<WriteOutcome, MemoryError> {
        Ok(check_size(content, DEFAULT_MAX_CHARS).unwrap_or(WriteOutcome::Written))
    }
}
