//! Memory trait: the long-term note store.
//!
//! Long-term memory is a single small text document (markdown by
//! convention). It is read at the start of every top-level turn to seed
//! the system prompt and replaced wholesale when the model emits a
//! memory-update block. Writes larger than the cap are refused.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::MemoryError;

/// Default size cap for the note document, in characters.
pub const DEFAULT_MAX_CHARS: usize = 2000;

/// Result of a write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// The document was replaced.
    Written,
    /// The content exceeded the cap; nothing was stored.
    RejectedTooLarge { len: usize, max: usize },
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written)
    }
}

/// Check `content` against a character cap.
pub fn check_size(content: &str, max_chars: usize) -> Option<WriteOutcome> {
    let len = content.chars().count();
    (len > max_chars).then_some(WriteOutcome::RejectedTooLarge { len, max: max_chars })
}

/// Insert `- note` into the `## section` of a markdown document.
///
/// The note goes before the first bullet, heading or blank line following
/// the section header, or at the end of the document if none follows.
/// Returns `None` when the section does not exist.
pub fn insert_note(content: &str, section: &str, note: &str) -> Option<String> {
    let header = format!("## {section}");
    let lines: Vec<&str> = content.split('\n').collect();
    let header_at = lines.iter().position(|l| l.trim() == header)?;

    let insert_at = lines[header_at + 1..]
        .iter()
        .position(|l| l.starts_with("- ") || l.starts_with("##") || l.is_empty())
        .map(|offset| header_at + 1 + offset)
        .unwrap_or(lines.len());

    let bullet = format!("- {note}");
    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 1);
    out.extend_from_slice(&lines[..insert_at]);
    out.push(&bullet);
    out.extend_from_slice(&lines[insert_at..]);
    Some(out.join("\n"))
}

/// The core MemoryStore trait.
///
/// Implementations: markdown file, in-memory (for testing), none (no-op).
/// Stores are shared between sessions; the last writer wins.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The store name (e.g., "file", "in_memory", "none").
    fn name(&self) -> &str;

    /// Maximum accepted document size, in characters.
    fn max_chars(&self) -> usize {
        DEFAULT_MAX_CHARS
    }

    /// Read the whole document. A store that was never written reads as "".
    async fn read(&self) -> Result<String, MemoryError>;

    /// Replace the whole document, unless it exceeds the cap.
    async fn write(&self, content: &str) -> Result<WriteOutcome, MemoryError>;

    /// Add a bullet note under an existing `## section` heading.
    async fn append_to_section(&self, section: &str, note: &str) -> Result<WriteOutcome, MemoryError> {
        let current = self.read().await?;
        let updated = insert_note(&current, section, note)
            .ok_or_else(|| MemoryError::SectionNotFound(section.to_string()))?;
        self.write(&updated).await
    }
}
