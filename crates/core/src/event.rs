//! Session events: the transport-facing progress envelope.
//!
//! The orchestration loop (and any nested subagent loop) reports progress
//! through an [`Observer`]. Observers are strictly best-effort: a failed
//! delivery is logged and dropped, it never fails the turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

/// A timestamped event emitted during a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub kind: EventKind,
}

impl SessionEvent {
    pub fn now(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Kind-specific payload of a [`SessionEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// The user's message was accepted for processing.
    UserMessage { content: String },

    /// The model produced a reasoning block.
    ReasoningProgress { iteration: u32, content: String },

    /// A capability is about to run.
    ToolStart {
        tool_name: String,
        params: String,
        iteration: u32,
        depth: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subagent: Option<String>,
    },

    /// A capability finished (result is a preview).
    ToolResult {
        tool_name: String,
        result: String,
        /// Wall-clock seconds
        duration: f64,
        depth: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subagent: Option<String>,
    },

    /// Visible assistant text.
    AssistantChunk { content: String },

    /// The turn is settled.
    End { iterations: u32 },

    /// A transport-level problem (bad frame, busy session).
    Error { content: String },
}

impl EventKind {
    /// Wire name of this event kind.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::UserMessage { .. } => "user_message",
            Self::ReasoningProgress { .. } => "reasoning_progress",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolResult { .. } => "tool_result",
            Self::AssistantChunk { .. } => "assistant_chunk",
            Self::End { .. } => "end",
            Self::Error { .. } => "error",
        }
    }
}

/// The receiving side went away.
#[derive(Debug, Error)]
#[error("observer closed")]
pub struct ObserverClosed;

/// Sink for session events.
pub trait Observer: Send + Sync {
    fn emit(&self, event: SessionEvent) -> Result<(), ObserverClosed>;
}

/// Emit an event to an optional observer, swallowing delivery failures.
pub fn notify(observer: Option<&Arc<dyn Observer>>, kind: EventKind) {
    let Some(observer) = observer else {
        return;
    };
    let event_type = kind.event_type();
    if observer.emit(SessionEvent::now(kind)).is_err() {
        trace!(event_type, "Observer closed, event dropped");
    }
}

/// Observer backed by an unbounded mpsc channel (one per connection).
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Observer for ChannelObserver {
    fn emit(&self, event: SessionEvent) -> Result<(), ObserverClosed> {
        self.sender.send(event).map_err(|_| ObserverClosed)
    }
}
