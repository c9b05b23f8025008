//! Tool trait: the abstraction over assistant capabilities.
//!
//! A tool takes the raw parameter string the model wrote between the
//! tool-call markers and returns text that is fed back to the model.
//! Some tools are *recursive*: invoking them runs a nested orchestration
//! loop (a subagent), so the registry tracks nesting depth explicitly.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use crate::error::ToolError;
use crate::event::Observer;

/// Default maximum subagent nesting depth.
pub const DEFAULT_MAX_DEPTH: u32 = 2;

/// Returned when a dispatch would exceed the nesting bound.
pub const DEPTH_EXCEEDED: &str = "Error: Maximum subagent nesting depth exceeded";

/// Whether a tool runs directly or spins up a nested loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Plain capability (time, search, fetch, ...)
    Direct,
    /// Subagent: runs its own orchestration loop when invoked
    Recursive,
}

/// Where in the recursion a dispatch happens.
///
/// Passed explicitly down every dispatch chain so concurrent sessions and
/// concurrent nested dispatches never share a notion of "current depth".
#[derive(Clone)]
pub struct RecursionContext {
    /// Nesting level, 0 for the top-level loop
    pub depth: u32,
    /// Deepest level at which a tool may still be invoked
    pub max_depth: u32,
    /// Iteration of the loop that issued the call (1-based, 0 before the first)
    pub iteration: u32,
    /// Iteration budget of that loop
    pub max_iterations: u32,
    /// Progress sink, inherited by nested loops
    pub observer: Option<Arc<dyn Observer>>,
}

impl RecursionContext {
    /// Context for a top-level turn.
    pub fn root(max_depth: u32, max_iterations: u32) -> Self {
        Self {
            depth: 0,
            max_depth,
            iteration: 0,
            max_iterations,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Context for a loop nested one level below this one.
    pub fn nested(&self, max_iterations: u32) -> Self {
        Self {
            depth: self.depth + 1,
            max_depth: self.max_depth,
            iteration: 0,
            max_iterations,
            observer: self.observer.clone(),
        }
    }

    /// Same context, positioned at the given iteration.
    pub fn at_iteration(&self, iteration: u32) -> Self {
        Self {
            iteration,
            ..self.clone()
        }
    }

    pub fn observer(&self) -> Option<&Arc<dyn Observer>> {
        self.observer.as_ref()
    }
}

impl std::fmt::Debug for RecursionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursionContext")
            .field("depth", &self.depth)
            .field("max_depth", &self.max_depth)
            .field("iteration", &self.iteration)
            .field("max_iterations", &self.max_iterations)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// What a tool sees of its caller.
#[derive(Clone, Copy)]
pub struct ToolContext<'a> {
    /// The registry that dispatched this call (nested loops dispatch through it)
    pub registry: &'a ToolRegistry,
    /// Depth/iteration/observer of the calling loop
    pub recursion: &'a RecursionContext,
}

/// The core Tool trait.
///
/// Each capability (get_time, web_search, subagents, ...) implements this
/// trait and is registered in the [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "get_time").
    fn name(&self) -> &str;

    /// A description of what this tool does and what params it takes (sent to the model).
    fn description(&self) -> &str;

    /// Direct or recursive.
    fn kind(&self) -> ToolKind {
        ToolKind::Direct
    }

    /// Run the tool with the raw parameter string.
    ///
    /// Errors are turned into text by [`ToolRegistry::dispatch`]; a tool may
    /// also report soft failures as `Ok("Error: ...")`.
    async fn invoke(&self, params: &str, ctx: ToolContext<'_>) -> Result<String, ToolError>;
}

/// A registry of available tools.
///
/// Read-only after startup; shared between sessions behind an `Arc`.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
    max_depth: u32,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(max_depth: u32) -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            max_depth,
        }
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ToolError::DuplicateName(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.index.get(name).map(|&i| self.tools[i].as_ref())
    }

    /// All registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Context for a top-level loop dispatching through this registry.
    pub fn root_context(&self, max_iterations: u32) -> RecursionContext {
        RecursionContext::root(self.max_depth, max_iterations)
    }

    /// Whether a tool is offered to a loop running at `depth`.
    ///
    /// One level above the bound, subagents are hidden: a nested loop
    /// started from there would have nothing left it could delegate to.
    fn is_visible(&self, tool: &dyn Tool, depth: u32) -> bool {
        tool.kind() == ToolKind::Direct || depth.saturating_add(1) < self.max_depth
    }

    /// Tools advertised to the model at the given depth.
    pub fn list(&self, depth: u32) -> Vec<&dyn Tool> {
        self.tools
            .iter()
            .map(|t| t.as_ref())
            .filter(|t| self.is_visible(*t, depth))
            .collect()
    }

    /// The tool list as it appears in a system prompt.
    pub fn describe(&self, depth: u32) -> String {
        let lines: Vec<String> = self
            .list(depth)
            .iter()
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect();
        if lines.is_empty() {
            "No tools available.".into()
        } else {
            lines.join("\n")
        }
    }

    fn unknown(&self, name: &str, depth: u32) -> String {
        let available: Vec<&str> = self.list(depth).iter().map(|t| t.name()).collect();
        format!(
            "Error: Unknown tool '{name}'. Available: {}",
            available.join(", ")
        )
    }

    /// Run a tool by name. Never fails: every problem becomes result text.
    pub async fn dispatch(&self, name: &str, params: &str, ctx: &RecursionContext) -> String {
        let Some(tool) = self.get(name) else {
            debug!(tool = %name, depth = ctx.depth, "Unknown tool requested");
            return self.unknown(name, ctx.depth);
        };

        if ctx.depth > self.max_depth {
            warn!(tool = %name, depth = ctx.depth, max_depth = self.max_depth, "Dispatch refused: depth exceeded");
            return DEPTH_EXCEEDED.into();
        }

        if !self.is_visible(tool, ctx.depth) {
            debug!(tool = %name, depth = ctx.depth, "Hidden subagent requested");
            return self.unknown(name, ctx.depth);
        }

        debug!(tool = %name, depth = ctx.depth, iteration = ctx.iteration, "Dispatching tool");
        let started = Instant::now();
        let invocation = tool.invoke(
            params,
            ToolContext {
                registry: self,
                recursion: ctx,
            },
        );
        let result = match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Tool failed");
                format!("Error running {name}: {e}")
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(tool = %name, panic = %message, "Tool panicked");
                format!("Error running {name}: {message}")
            }
        };
        debug!(
            tool = %name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            result_len = result.len(),
            "Tool finished"
        );
        result
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".into()
    }
}
