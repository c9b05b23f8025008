//! The top-level agent: one orchestration loop per user turn.

use std::sync::Arc;

use smore_config::AppConfig;
use smore_core::event::{notify, EventKind, Observer};
use smore_core::memory::MemoryStore;
use smore_core::message::Message;
use smore_core::provider::Provider;
use smore_core::tool::ToolRegistry;
use tracing::{info, warn};

use crate::orchestrator::{run_loop, LoopEnv, LoopOutcome};
use crate::prompt;

/// Orchestrates model calls and tool execution for top-level turns.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    model: String,
    temperature: f32,

    /// Tool registry (shared, read-only)
    tools: Arc<ToolRegistry>,

    /// Long-term notes, read once and written at most once per turn
    memory: Arc<dyn MemoryStore>,

    /// Base system prompt, before tools and notes are appended
    system_prompt: String,

    /// Maximum model calls per turn
    max_iterations: u32,

    steer_every: u32,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            tools,
            memory,
            system_prompt: "You are a helpful personal assistant.".into(),
            max_iterations: 10,
            steer_every: 3,
        }
    }

    /// Build from configuration with already-constructed collaborators.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self::new(provider, config.provider.model.clone(), tools, memory)
            .with_temperature(config.provider.temperature)
            .with_system_prompt(config.system_prompt.clone())
            .with_max_iterations(config.agent.max_iterations)
            .with_steer_every(config.agent.steer_every)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the maximum number of model calls per turn.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_steer_every(mut self, every: u32) -> Self {
        self.steer_every = every;
        self
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.memory
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The system prompt for the next turn, with the current notes.
    pub async fn build_system_prompt(&self) -> String {
        let notes = match self.memory.read().await {
            Ok(notes) => notes,
            Err(e) => {
                warn!(error = %e, "Could not read memory, continuing without it");
                String::new()
            }
        };
        prompt::system_prompt(
            &self.system_prompt,
            &self.tools.describe(0),
            &notes,
            self.memory.max_chars(),
        )
    }

    /// Run one turn over `history` (the conversation so far, ending with the
    /// user's message). Streams visible text and progress to `observer`.
    pub async fn run_turn(
        &self,
        history: &[Message],
        observer: Option<Arc<dyn Observer>>,
    ) -> LoopOutcome {
        info!(
            messages = history.len(),
            model = %self.model,
            "Processing turn"
        );

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(self.build_system_prompt().await));
        messages.extend_from_slice(history);

        let mut ctx = self.tools.root_context(self.max_iterations);
        if let Some(observer) = observer {
            ctx = ctx.with_observer(observer);
        }

        let env = LoopEnv {
            provider: self.provider.as_ref(),
            registry: &self.tools,
            memory: Some(self.memory.as_ref()),
            model: &self.model,
            temperature: self.temperature,
            steer_every: self.steer_every,
            streaming: true,
            subagent: None,
        };
        let outcome = run_loop(&env, messages, &ctx).await;

        info!(
            iterations = outcome.iterations,
            tool_calls = outcome.tool_calls,
            exhausted = outcome.exhausted,
            "Turn complete"
        );
        notify(
            ctx.observer(),
            EventKind::End {
                iterations: outcome.iterations,
            },
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use smore_core::event::ChannelObserver;
    use smore_memory::InMemoryStore;

    fn agent(provider: Arc<ScriptedProvider>, memory: Arc<InMemoryStore>) -> AgentLoop {
        let mut tools = ToolRegistry::new();
        smore_tools::register_builtin(&mut tools).unwrap();
        AgentLoop::new(provider, "test-model", Arc::new(tools), memory)
            .with_system_prompt("You are a test assistant.")
    }

    #[tokio::test]
    async fn system_prompt_carries_tools_and_notes() {
        let provider = Arc::new(ScriptedProvider::new(vec!["Hi!"]));
        let memory = Arc::new(InMemoryStore::with_content("## Preferences\n- metric units"));
        let agent = agent(provider.clone(), memory);

        let outcome = agent.run_turn(&[Message::user("hello")], None).await;
        assert_eq!(outcome.answer, "Hi!");

        let request = provider.request(0).unwrap();
        assert_eq!(request.model, "test-model");
        let system = &request.messages[0].content;
        assert!(system.starts_with("You are a test assistant."));
        assert!(system.contains("- calculate:"));
        assert!(system.contains("- metric units"));
        assert_eq!(request.messages[1].content, "hello");
    }

    #[tokio::test]
    async fn builtin_tool_round_trip() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            "Let me work that out. [TOOL:calculate]6*7[/TOOL]",
            "It's 42.",
        ]));
        let agent = agent(provider.clone(), Arc::new(InMemoryStore::new()));

        let outcome = agent.run_turn(&[Message::user("6 times 7?")], None).await;
        assert_eq!(outcome.answer, "Let me work that out.\n\nIt's 42.");
        let second = provider.request(1).unwrap();
        assert_eq!(
            second.messages.last().unwrap().content,
            "[Tool Result from calculate]: Result: 42"
        );
    }

    #[tokio::test]
    async fn end_event_closes_turn() {
        let provider = Arc::new(ScriptedProvider::new(vec!["Done."]));
        let agent = agent(provider, Arc::new(InMemoryStore::new()));
        let (observer, mut rx) = ChannelObserver::new();

        agent
            .run_turn(&[Message::user("hi")], Some(Arc::new(observer)))
            .await;

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event.kind);
        }
        assert_eq!(last, Some(EventKind::End { iterations: 1 }));
    }
}
