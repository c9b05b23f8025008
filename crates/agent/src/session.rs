//! A conversation with the agent, one turn at a time.

use std::sync::Arc;

use smore_core::event::{notify, EventKind, Observer};
use smore_core::message::{Conversation, ConversationId, Message};
use tokio::sync::Mutex;
use tracing::debug;

use crate::loop_runner::AgentLoop;
use crate::orchestrator::LoopOutcome;

/// Conversation state for one client.
///
/// Turns are serialized: a second `send` waits until the first finishes.
/// Only user messages and final answers are kept; tool traffic stays inside
/// the turn that produced it.
pub struct Session {
    id: ConversationId,
    agent: Arc<AgentLoop>,
    conversation: Mutex<Conversation>,
}

impl Session {
    pub fn new(agent: Arc<AgentLoop>) -> Self {
        let conversation = Conversation::new();
        Self {
            id: conversation.id.clone(),
            agent,
            conversation: Mutex::new(conversation),
        }
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    /// Run one turn for `text` and record the answer.
    pub async fn send(&self, text: &str, observer: Option<Arc<dyn Observer>>) -> LoopOutcome {
        let mut conversation = self.conversation.lock().await;
        debug!(session = %self.id, history = conversation.len(), "Turn started");

        notify(
            observer.as_ref(),
            EventKind::UserMessage {
                content: text.to_string(),
            },
        );
        conversation.push(Message::user(text));

        let outcome = self.agent.run_turn(&conversation.messages, observer).await;
        conversation.push(Message::assistant(outcome.answer.clone()));
        outcome
    }

    /// Snapshot of the recorded messages.
    pub async fn history(&self) -> Vec<Message> {
        self.conversation.lock().await.messages.clone()
    }

    pub async fn clear(&self) {
        let mut conversation = self.conversation.lock().await;
        conversation.messages.clear();
    }
}
