//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use smore_core::error::MemoryError;
use smore_core::memory::{check_size, MemoryStore, WriteOutcome, DEFAULT_MAX_CHARS};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// A note store that lives only as long as the process.
pub struct InMemoryStore {
    content: Arc<RwLock<String>>,
    max_chars: usize,
    writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_content("")
    }

    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: Arc::new(RwLock::new(content.into())),
            max_chars: DEFAULT_MAX_CHARS,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Number of accepted writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str { "in_memory" }

    fn max_chars(&self) -> usize {
        self.max_chars
    }

    async fn read(&self) -> Result<String, MemoryError> {
        Ok(self.content.read().await.clone())
    }

    async fn write(&self, content: &str) -> Result<WriteOutcome, MemoryError> {
        if let Some(rejected) = check_size(content, self.max_chars) {
            return Ok(rejected);
        }
        *self.content.write().await = content.to_string();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(WriteOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read() {
        let store = InMemoryStore::new();
        assert_eq!(store.read().await.unwrap(), "");
        store.write("remember the milk").await.unwrap();
        assert_eq!(store.read().await.unwrap(), "remember the milk");
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn rejects_over_cap() {
        let store = InMemoryStore::with_content("keep");
        let outcome = store.write(&"y".repeat(2001)).await.unwrap();
        assert!(!outcome.is_written());
        assert_eq!(store.read().await.unwrap(), "keep");
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn append_uses_default_section_logic() {
        let store = InMemoryStore::with_content("## Todo\n- laundry");
        store.append_to_section("Todo", "dishes").await.unwrap();
        assert_eq!(store.read().await.unwrap(), "## Todo\n- dishes\n- laundry");
    }
}
