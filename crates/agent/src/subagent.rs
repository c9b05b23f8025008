//! Subagents: tools that delegate a task to a nested orchestration loop.
//!
//! A subagent gets its own system prompt (the preset template with the tool
//! list for its depth, but no long-term notes) and the task text as the only
//! user message. Its answer comes back to the parent loop as a tool result.

use std::sync::Arc;

use async_trait::async_trait;
use smore_core::error::ToolError;
use smore_core::message::Message;
use smore_core::provider::Provider;
use smore_core::tool::{Tool, ToolContext, ToolKind, ToolRegistry, DEPTH_EXCEEDED};
use tracing::{debug, info};

use crate::orchestrator::{run_loop, LoopEnv};

/// Appended to the prompt of a subagent that may not delegate further.
pub const MAX_DEPTH_NOTICE: &str =
    "\n\nIMPORTANT: You are at maximum nesting depth. You cannot delegate to other subagents.";

/// Static description of a subagent.
#[derive(Debug, Clone, Copy)]
pub struct SubagentPreset {
    pub name: &'static str,
    pub description: &'static str,
    /// System prompt; `{tools}` is replaced by the tool list
    pub template: &'static str,
}

/// Model settings shared by every subagent.
#[derive(Debug, Clone)]
pub struct SubagentSettings {
    pub model: String,
    pub temperature: f32,
    pub max_iterations: u32,
    pub steer_every: u32,
}

impl Default for SubagentSettings {
    fn default() -> Self {
        Self {
            model: "gemma3:12b".into(),
            temperature: 0.7,
            max_iterations: 5,
            steer_every: 3,
        }
    }
}

pub const EMAIL_ASSISTANT: SubagentPreset = SubagentPreset {
    name: "email_assistant",
    description: "Specialized agent for complex email tasks: search across accounts, \
                  summarize threads, draft responses, manage workflows",
    template: "You are an email management specialist subagent.

Your job is to handle complex email tasks efficiently using available tools.

## Available Tools
{tools}

## Strategy for Email Tasks
1. Work out which mailbox or thread the task is about
2. Search with specific queries (sender, recipient, subject)
3. Read the relevant messages to gather details
4. Summarize findings concisely
5. Draft replies when requested

Use tools in [TOOL:name]params[/TOOL] format. Be thorough but concise.
Focus on the specific task delegated to you.",
};

pub const RESEARCH_ASSISTANT: SubagentPreset = SubagentPreset {
    name: "research_assistant",
    description: "Specialized agent for research and information gathering: search emails \
                  for data, compile information, synthesize findings",
    template: "You are a research and information gathering subagent.

Your job is to systematically gather information and synthesize findings.

## Available Tools
{tools}

## Research Strategy
1. Break the question into searchable parts
2. Gather information from the available sources
3. Synthesize findings into a clear summary
4. Cite sources when relevant

Use tools in [TOOL:name]params[/TOOL] format. Be systematic and thorough.
Focus on the specific research task delegated to you.",
};

pub const CODE_ASSISTANT: SubagentPreset = SubagentPreset {
    name: "code_assistant",
    description: "Specialized agent for technical and code-related tasks: analyze technical \
                  emails, extract code snippets, explain technical concepts",
    template: "You are a technical and code analysis subagent.

Your job is to help with code-related and technical tasks.

## Available Tools
{tools}

## Technical Analysis Strategy
1. Find the technical content the task refers to
2. Analyze code snippets and technical discussions
3. Extract the key technical details
4. Give clear explanations

Use tools in [TOOL:name]params[/TOOL] format. Be precise and technical.
Focus on the specific technical task delegated to you.",
};

/// Every built-in preset, in registration order.
pub const PRESETS: [SubagentPreset; 3] = [EMAIL_ASSISTANT, RESEARCH_ASSISTANT, CODE_ASSISTANT];

/// Build a subagent's system prompt for the given depth.
pub fn subagent_prompt(template: &str, tools: &str, depth: u32, max_depth: u32) -> String {
    let mut prompt = template.replace("{tools}", tools);
    if depth >= max_depth {
        prompt.push_str(MAX_DEPTH_NOTICE);
    }
    prompt
}

/// A tool that runs a nested orchestration loop.
pub struct SubagentTool {
    name: String,
    description: String,
    template: String,
    provider: Arc<dyn Provider>,
    settings: SubagentSettings,
}

impl SubagentTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        template: impl Into<String>,
        provider: Arc<dyn Provider>,
        settings: SubagentSettings,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            template: template.into(),
            provider,
            settings,
        }
    }

    pub fn from_preset(
        preset: SubagentPreset,
        provider: Arc<dyn Provider>,
        settings: SubagentSettings,
    ) -> Self {
        Self::new(preset.name, preset.description, preset.template, provider, settings)
    }
}

#[async_trait]
impl Tool for SubagentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Recursive
    }

    async fn invoke(&self, params: &str, ctx: ToolContext<'_>) -> Result<String, ToolError> {
        let depth = ctx.recursion.depth + 1;
        let max_depth = ctx.recursion.max_depth;
        if depth > max_depth {
            debug!(subagent = %self.name, depth, max_depth, "Refusing to nest deeper");
            return Ok(DEPTH_EXCEEDED.to_string());
        }

        let system = subagent_prompt(&self.template, &ctx.registry.describe(depth), depth, max_depth);
        let messages = vec![Message::system(system), Message::user(params)];
        let nested = ctx.recursion.nested(self.settings.max_iterations);

        info!(subagent = %self.name, depth, "Starting subagent");
        let env = LoopEnv {
            provider: self.provider.as_ref(),
            registry: ctx.registry,
            memory: None,
            model: &self.settings.model,
            temperature: self.settings.temperature,
            steer_every: self.settings.steer_every,
            streaming: false,
            subagent: Some(&self.name),
        };
        let outcome = run_loop(&env, messages, &nested).await;
        info!(
            subagent = %self.name,
            depth,
            iterations = outcome.iterations,
            tool_calls = outcome.tool_calls,
            exhausted = outcome.exhausted,
            "Subagent finished"
        );

        Ok(outcome.answer)
    }
}

/// Register every built-in subagent.
pub fn register_presets(
    registry: &mut ToolRegistry,
    provider: Arc<dyn Provider>,
    settings: &SubagentSettings,
) -> Result<(), ToolError> {
    for preset in PRESETS {
        registry.register(Box::new(SubagentTool::from_preset(
            preset,
            Arc::clone(&provider),
            settings.clone(),
        )))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use smore_core::tool::RecursionContext;

    fn settings() -> SubagentSettings {
        SubagentSettings {
            model: "test".into(),
            temperature: 0.0,
            max_iterations: 5,
            steer_every: 3,
        }
    }

    #[test]
    fn prompt_substitutes_tools() {
        let prompt = subagent_prompt("Tools:\n{tools}\nGo.", "- get_time: clock", 1, 2);
        assert_eq!(prompt, "Tools:\n- get_time: clock\nGo.");
    }

    #[test]
    fn prompt_adds_depth_notice_at_bound() {
        let prompt = subagent_prompt("{tools}", "x", 2, 2);
        assert!(prompt.ends_with(MAX_DEPTH_NOTICE));
    }

    #[test]
    fn presets_are_recursive_with_distinct_names() {
        let provider: Arc<dyn Provider> = Arc::new(ScriptedProvider::new(vec![]));
        let mut registry = ToolRegistry::new();
        register_presets(&mut registry, provider, &settings()).unwrap();
        assert_eq!(
            registry.names(),
            vec!["email_assistant", "research_assistant", "code_assistant"]
        );
        assert!(registry
            .list(0)
            .iter()
            .all(|t| t.kind() == ToolKind::Recursive));
        assert!(PRESETS.iter().all(|p| p.template.contains("{tools}")));
    }

    #[tokio::test]
    async fn runs_nested_loop_with_own_prompt() {
        let scripted = Arc::new(ScriptedProvider::new(vec!["Summary: all good."]));
        let provider: Arc<dyn Provider> = scripted.clone();
        let mut registry = ToolRegistry::new();
        register_presets(&mut registry, provider, &settings()).unwrap();

        let result = registry
            .dispatch("research_assistant", "look into X", &RecursionContext::root(2, 10))
            .await;
        assert_eq!(result, "Summary: all good.");

        let request = scripted.request(0).unwrap();
        assert_eq!(request.messages.len(), 2);
        let system = &request.messages[0].content;
        assert!(system.starts_with("You are a research and information gathering subagent."));
        // Depth 1 of 2: nested subagents are hidden, no depth notice yet
        assert!(!system.contains("research_assistant"));
        assert!(!system.contains("IMPORTANT"));
        assert_eq!(request.messages[1].content, "look into X");
    }

    #[tokio::test]
    async fn refuses_beyond_max_depth() {
        let scripted = Arc::new(ScriptedProvider::new(vec![]));
        let tool = SubagentTool::from_preset(CODE_ASSISTANT, scripted.clone(), settings());
        let registry = ToolRegistry::new();
        let mut ctx = RecursionContext::root(2, 10);
        ctx.depth = 2;

        let result = tool
            .invoke(
                "task",
                ToolContext {
                    registry: &registry,
                    recursion: &ctx,
                },
            )
            .await
            .unwrap();
        assert_eq!(result, DEPTH_EXCEEDED);
        assert_eq!(scripted.call_count(), 0);
    }
}
