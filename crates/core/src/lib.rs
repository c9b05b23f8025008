//! # Smore Core
//!
//! Domain types, traits, and error definitions for the Smore assistant
//! runtime. Every other crate depends inward on this one.
//!
//! ## Design Philosophy
//!
//! Each collaborator of the orchestration loop is a trait here
//! ([`Provider`], [`Tool`], [`MemoryStore`], [`Observer`]). Implementations
//! live in their respective crates, so tests can swap in scripted stubs.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod memory;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{MemoryError, ProviderError, ToolError};
pub use message::{Conversation, ConversationId, Message, Role};
pub use provider::{ChatRequest, ChunkReceiver, Provider, StreamChunk};
pub use tool::{RecursionContext, Tool, ToolContext, ToolKind, ToolRegistry};
pub use memory::{MemoryStore, WriteOutcome};
pub use event::{ChannelObserver, EventKind, Observer, SessionEvent};
