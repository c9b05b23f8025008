//! The Smore orchestration engine.
//!
//! A turn goes through the [`AgentLoop`]:
//!
//! 1. **Build context**: system prompt, tool list and long-term notes
//! 2. **Stream** the model response through the [`StreamFilter`]
//! 3. **Parse** memory, reasoning and tool-call blocks ([`protocol`])
//! 4. **If a tool call**: dispatch it, feed the result back, loop to step 2
//! 5. **Otherwise**: the remaining text is the answer
//!
//! Subagents ([`subagent`]) are tools that run the same loop one level
//! deeper, bounded by the registry's maximum depth.

pub mod loop_runner;
pub mod orchestrator;
pub mod prompt;
pub mod protocol;
pub mod session;
pub mod stream_filter;
pub mod subagent;
pub mod testing;

use std::sync::Arc;

use smore_config::AppConfig;
use smore_core::error::ToolError;
use smore_core::provider::Provider;
use smore_core::tool::ToolRegistry;
use tracing::info;

pub use loop_runner::AgentLoop;
pub use orchestrator::{run_loop, LoopEnv, LoopOutcome};
pub use protocol::{parse_response, parse_tool_call, ParsedResponse, ToolCall};
pub use session::Session;
pub use stream_filter::{StreamFilter, StreamState};
pub use subagent::{SubagentPreset, SubagentSettings, SubagentTool};

/// Registry with the built-in tools and, when enabled, the subagent presets.
pub fn build_registry(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::with_max_depth(config.subagents.max_depth);
    smore_tools::register_builtin(&mut registry)?;

    if config.subagents.enabled {
        let settings = SubagentSettings {
            model: config.provider.model.clone(),
            temperature: config.provider.temperature,
            max_iterations: config.subagents.max_iterations,
            steer_every: config.agent.steer_every,
        };
        subagent::register_presets(&mut registry, provider, &settings)?;
    }

    info!(
        tools = registry.len(),
        max_depth = registry.max_depth(),
        "Tool registry ready"
    );
    Ok(registry)
}

/// Agent wired from configuration: provider, memory store and tool registry.
pub fn build_agent(config: &AppConfig) -> Result<AgentLoop, ToolError> {
    let provider = smore_providers::router::build_from_config(config);
    let memory = smore_memory::build_from_config(&config.memory);
    let tools = build_registry(config, Arc::clone(&provider))?;
    Ok(AgentLoop::from_config(config, provider, Arc::new(tools), memory))
}
