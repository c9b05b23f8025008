//! File-based memory store: a single markdown notes document.
//!
//! The file is the only copy. Every read goes to disk, so edits made by
//! hand or by another process show up on the next turn; every accepted
//! write replaces the document in full.
//!
//! Storage location: `~/.smore/memory.md`

use async_trait::async_trait;
use smore_core::error::MemoryError;
use smore_core::memory::{check_size, insert_note, MemoryStore, WriteOutcome, DEFAULT_MAX_CHARS};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// A file-backed note store.
pub struct FileStore {
    path: PathBuf,
    max_chars: usize,
    /// Serializes read-modify-write sequences within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store for `path`. A missing file reads as empty and is
    /// created on the first write.
    pub fn new(path: PathBuf) -> Self {
        debug!(path = %path.display(), "File memory store opened");
        Self {
            path,
            max_chars: DEFAULT_MAX_CHARS,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Default path: `~/.smore/memory.md`
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".smore").join("memory.md")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<String, MemoryError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(MemoryError::Storage(format!(
                "Failed to read memory file {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn flush(&self, content: &str) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }

        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))
    }

    async fn write_locked(&self, content: &str) -> Result<WriteOutcome, MemoryError> {
        if let Some(rejected) = check_size(content, self.max_chars) {
            return Ok(rejected);
        }
        self.flush(content).await?;
        debug!(path = %self.path.display(), chars = content.chars().count(), "Memory file updated");
        Ok(WriteOutcome::Written)
    }
}

#[async_trait]
impl MemoryStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn max_chars(&self) -> usize {
        self.max_chars
    }

    async fn read(&self) -> Result<String, MemoryError> {
        self.load().await
    }

    async fn write(&self, content: &str) -> Result<WriteOutcome, MemoryError> {
        let _guard = self.write_lock.lock().await;
        self.write_locked(content).await
    }

    async fn append_to_section(&self, section: &str, note: &str) -> Result<WriteOutcome, MemoryError> {
        let _guard = self.write_lock.lock().await;
        let current = self.load().await?;
        let updated = insert_note(&current, section, note)
            .ok_or_else(|| MemoryError::SectionNotFound(section.to_string()))?;
        self.write_locked(&updated).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("memory.md"));
        assert_eq!(store.read().await.unwrap(), "");
    }

    #[tokio::test]
    async fn write_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.md");

        let store = FileStore::new(path.clone());
        let outcome = store.write("## Preferences\n- tea").await.unwrap();
        assert_eq!(outcome, WriteOutcome::Written);

        let reopened = FileStore::new(path);
        assert_eq!(reopened.read().await.unwrap(), "## Preferences\n- tea");
    }

    #[tokio::test]
    async fn oversized_write_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.md");
        std::fs::write(&path, "original").unwrap();

        let store = FileStore::new(path.clone());
        let outcome = store.write(&"x".repeat(2500)).await.unwrap();
        assert_eq!(outcome, WriteOutcome::RejectedTooLarge { len: 2500, max: 2000 });
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
        assert_eq!(store.read().await.unwrap(), "original");
    }

    #[tokio::test]
    async fn custom_cap_applies() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("m.md")).with_max_chars(5);
        assert!(store.write("12345").await.unwrap().is_written());
        assert!(!store.write("123456").await.unwrap().is_written());
    }

    #[tokio::test]
    async fn append_to_section_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.md");
        std::fs::write(&path, "## People\n- Sam\n").unwrap();
        let store = FileStore::new(path.clone());

        store.append_to_section("People", "Alex").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "## People\n- Alex\n- Sam\n");

        let err = store.append_to_section("Pets", "cat").await.unwrap_err();
        assert!(matches!(err, MemoryError::SectionNotFound(ref s) if s == "Pets"));
    }

    #[tokio::test]
    async fn edits_from_elsewhere_are_seen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.md");
        std::fs::write(&path, "## People\n- Sam\n").unwrap();

        let server = FileStore::new(path.clone());
        assert_eq!(server.read().await.unwrap(), "## People\n- Sam\n");

        // Another process (`smore memory add`) edits the same file
        let cli = FileStore::new(path.clone());
        cli.append_to_section("People", "Alex").await.unwrap();
        assert_eq!(server.read().await.unwrap(), "## People\n- Alex\n- Sam\n");

        // And a hand edit
        std::fs::write(&path, "## People\n").unwrap();
        assert_eq!(server.read().await.unwrap(), "## People\n");
    }

    #[tokio::test]
    async fn unreadable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be
        let store = FileStore::new(dir.path().to_path_buf());
        assert!(matches!(store.read().await, Err(MemoryError::Storage(_))));
    }
}
