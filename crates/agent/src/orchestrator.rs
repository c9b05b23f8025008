//! The orchestration loop: one user turn, possibly many model calls.
//!
//! Each iteration streams a full response through the [`StreamFilter`],
//! applies the tag rules from [`crate::protocol`] and either settles on an
//! answer or dispatches one tool call and goes around again. Subagents run
//! the same loop one level deeper, without streaming and without touching
//! long-term memory.

use std::time::Instant;

use smore_core::error::ProviderError;
use smore_core::event::{notify, EventKind};
use smore_core::memory::{MemoryStore, WriteOutcome};
use smore_core::message::Message;
use smore_core::provider::{ChatRequest, Provider};
use smore_core::tool::{RecursionContext, ToolRegistry};
use tracing::{debug, info, warn};

use crate::prompt::STEERING_PROMPT;
use crate::protocol::{self, ParsedResponse};
use crate::stream_filter::StreamFilter;

/// Answer used when the model never produced any visible text.
pub const EMPTY_ANSWER: &str =
    "I'm sorry, I wasn't able to come up with a response. Could you try rephrasing?";

/// Longest tool result preview carried by events.
const RESULT_PREVIEW_CHARS: usize = 200;

/// Length of the last-response excerpt in the exhaustion message.
const EXCERPT_CHARS: usize = 200;

/// Everything one loop run needs besides the messages.
pub struct LoopEnv<'a> {
    pub provider: &'a dyn Provider,
    pub registry: &'a ToolRegistry,
    /// Store that receives memory updates; `None` strips them without writing
    pub memory: Option<&'a dyn MemoryStore>,
    pub model: &'a str,
    pub temperature: f32,
    /// Inject a steering message after a tool call every this many iterations
    pub steer_every: u32,
    /// Emit visible text as `assistant_chunk` events
    pub streaming: bool,
    /// Name of the subagent running this loop, for event tagging
    pub subagent: Option<&'a str>,
}

/// How a loop run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    /// Preambles followed by the final text (or a fallback message)
    pub answer: String,
    pub iterations: u32,
    pub tool_calls: u32,
    /// The iteration budget ran out before a final answer
    pub exhausted: bool,
    /// Result of the memory commit, when one was attempted
    pub memory: Option<WriteOutcome>,
}

/// Drive the loop until an answer, a backend failure or the iteration bound.
///
/// Never returns an error: every failure becomes answer text.
pub async fn run_loop(
    env: &LoopEnv<'_>,
    mut messages: Vec<Message>,
    ctx: &RecursionContext,
) -> LoopOutcome {
    let mut preambles: Vec<String> = Vec::new();
    let mut tool_calls = 0;
    let mut memory = None;
    let mut last_text = String::new();
    let mut last_was_empty = false;

    for iteration in 1..=ctx.max_iterations {
        debug!(
            depth = ctx.depth,
            iteration,
            max_iterations = ctx.max_iterations,
            subagent = env.subagent.unwrap_or("-"),
            "Loop iteration"
        );

        let raw = match collect_response(env, &messages, ctx).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, depth = ctx.depth, "Model request failed");
                let apology = format!("Sorry, I couldn't reach the language model: {e}");
                emit_visible(env, ctx, apology.clone());
                return LoopOutcome {
                    answer: join_answer(preambles, apology),
                    iterations: iteration,
                    tool_calls,
                    exhausted: false,
                    memory,
                };
            }
        };

        let parsed = protocol::parse_response(&raw);
        if let Some(update) = parsed.memory_update.as_deref() {
            commit_memory(env, update, &mut memory).await;
        }
        if let Some(reasoning) = parsed.reasoning.as_deref() {
            debug!(iteration, reasoning = %reasoning, "Model reasoning");
            if env.subagent.is_none() {
                notify(
                    ctx.observer(),
                    EventKind::ReasoningProgress {
                        iteration,
                        content: reasoning.to_string(),
                    },
                );
            }
        }

        let ParsedResponse {
            text,
            tool_call,
            preamble,
            ..
        } = parsed;

        let Some(call) = tool_call else {
            if text.is_empty() {
                debug!(iteration, "Empty response, retrying");
                last_was_empty = true;
                continue;
            }
            return LoopOutcome {
                answer: join_answer(preambles, text),
                iterations: iteration,
                tool_calls,
                exhausted: false,
                memory,
            };
        };

        last_was_empty = false;
        last_text = text;
        if let Some(preamble) = preamble.filter(|p| !p.is_empty()) {
            preambles.push(preamble);
        }

        notify(
            ctx.observer(),
            EventKind::ToolStart {
                tool_name: call.name.clone(),
                params: call.params.clone(),
                iteration,
                depth: ctx.depth,
                subagent: env.subagent.map(str::to_string),
            },
        );

        let started = Instant::now();
        let result = env
            .registry
            .dispatch(&call.name, &call.params, &ctx.at_iteration(iteration))
            .await;
        let elapsed = started.elapsed().as_secs_f64();
        tool_calls += 1;

        notify(
            ctx.observer(),
            EventKind::ToolResult {
                tool_name: call.name.clone(),
                result: preview(&result),
                duration: (elapsed * 100.0).round() / 100.0,
                depth: ctx.depth,
                subagent: env.subagent.map(str::to_string),
            },
        );

        messages.push(Message::assistant(raw));
        messages.push(Message::user(format!(
            "[Tool Result from {}]: {}",
            call.name, result
        )));

        if env.steer_every > 0
            && iteration % env.steer_every == 0
            && iteration < ctx.max_iterations
        {
            debug!(iteration, "Injecting steering message");
            messages.push(Message::user(STEERING_PROMPT));
        }
    }

    let fallback = if last_was_empty || last_text.is_empty() {
        EMPTY_ANSWER.to_string()
    } else {
        let label = if env.subagent.is_some() {
            "Subagent reached maximum iterations"
        } else {
            "Reached maximum iterations"
        };
        format!(
            "{label} ({}). Last response: {}...",
            ctx.max_iterations,
            take_chars(&last_text, EXCERPT_CHARS)
        )
    };
    info!(
        depth = ctx.depth,
        max_iterations = ctx.max_iterations,
        tool_calls,
        "Iteration budget exhausted"
    );
    emit_visible(env, ctx, fallback.clone());

    LoopOutcome {
        answer: join_answer(preambles, fallback),
        iterations: ctx.max_iterations,
        tool_calls,
        exhausted: true,
        memory,
    }
}

/// Stream one model response, forwarding visible text when streaming.
async fn collect_response(
    env: &LoopEnv<'_>,
    messages: &[Message],
    ctx: &RecursionContext,
) -> Result<String, ProviderError> {
    let request = ChatRequest::new(env.model, messages.to_vec(), env.temperature);
    let mut chunks = env.provider.stream(request).await?;
    let mut filter = StreamFilter::new();

    while let Some(item) = chunks.recv().await {
        let chunk = item?;
        if let Some(content) = chunk.content.as_deref() {
            let visible = filter.push(content);
            emit_visible(env, ctx, visible);
        }
        if chunk.done {
            break;
        }
    }

    let finished = filter.finish();
    emit_visible(env, ctx, finished.tail);
    Ok(finished.raw)
}

fn emit_visible(env: &LoopEnv<'_>, ctx: &RecursionContext, visible: String) {
    if env.streaming && !visible.is_empty() {
        notify(ctx.observer(), EventKind::AssistantChunk { content: visible });
    }
}

/// Write a memory update at most once per run, and only with a store.
///
/// A rejected update does not use up the write; a later one in the same
/// turn may still land.
async fn commit_memory(env: &LoopEnv<'_>, update: &str, committed: &mut Option<WriteOutcome>) {
    let Some(store) = env.memory else {
        debug!(subagent = env.subagent.unwrap_or("-"), "Memory update stripped without a store");
        return;
    };
    if committed.is_some_and(|outcome| outcome.is_written()) {
        warn!("Second memory update in one turn ignored");
        return;
    }
    match store.write(update).await {
        Ok(outcome @ WriteOutcome::Written) => {
            info!(store = store.name(), chars = update.chars().count(), "Memory updated");
            *committed = Some(outcome);
        }
        Ok(outcome @ WriteOutcome::RejectedTooLarge { len, max }) => {
            warn!(len, max, "Memory update rejected: too large");
            *committed = Some(outcome);
        }
        Err(e) => warn!(error = %e, "Memory update failed"),
    }
}

fn join_answer(mut parts: Vec<String>, last: String) -> String {
    parts.push(last);
    parts.retain(|p| !p.is_empty());
    parts.join("\n\n")
}

fn take_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn preview(result: &str) -> String {
    let head = take_chars(result, RESULT_PREVIEW_CHARS);
    if head.len() < result.len() {
        format!("{head}...")
    } else {
        head.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use async_trait::async_trait;
    use smore_core::error::ToolError;
    use smore_core::event::ChannelObserver;
    use smore_core::tool::{Tool, ToolContext};
    use smore_memory::InMemoryStore;
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Repeat the input"
        }
        async fn invoke(&self, params: &str, _ctx: ToolContext<'_>) -> Result<String, ToolError> {
            Ok(format!("echo: {params}"))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Echo)).unwrap();
        registry
    }

    fn env<'a>(
        provider: &'a ScriptedProvider,
        registry: &'a ToolRegistry,
        memory: Option<&'a dyn MemoryStore>,
    ) -> LoopEnv<'a> {
        LoopEnv {
            provider,
            registry,
            memory,
            model: "test-model",
            temperature: 0.0,
            steer_every: 3,
            streaming: true,
            subagent: None,
        }
    }

    #[tokio::test]
    async fn plain_answer_in_one_iteration() {
        let provider = ScriptedProvider::new(vec!["Hello!"]);
        let registry = registry();
        let outcome = run_loop(
            &env(&provider, &registry, None),
            vec![Message::user("hi")],
            &RecursionContext::root(2, 10),
        )
        .await;
        assert_eq!(outcome.answer, "Hello!");
        assert_eq!(outcome.iterations, 1);
        assert!(!outcome.exhausted);
    }

    #[tokio::test]
    async fn tool_result_fed_back() {
        let provider = ScriptedProvider::new(vec![
            "Checking. [TOOL:echo]ping[/TOOL]",
            "Got it: pong.",
        ]);
        let registry = registry();
        let outcome = run_loop(
            &env(&provider, &registry, None),
            vec![Message::user("hi")],
            &RecursionContext::root(2, 10),
        )
        .await;

        assert_eq!(outcome.answer, "Checking.\n\nGot it: pong.");
        assert_eq!(outcome.tool_calls, 1);

        let second = provider.request(1).unwrap();
        let n = second.messages.len();
        assert_eq!(second.messages[n - 2].content, "Checking. [TOOL:echo]ping[/TOOL]");
        assert_eq!(second.messages[n - 1].content, "[Tool Result from echo]: echo: ping");
    }

    #[tokio::test]
    async fn unknown_tool_reported_to_model() {
        let provider = ScriptedProvider::new(vec!["[TOOL:nope]x[/TOOL]", "ok"]);
        let registry = registry();
        run_loop(
            &env(&provider, &registry, None),
            vec![Message::user("hi")],
            &RecursionContext::root(2, 10),
        )
        .await;
        let last = provider.request(1).unwrap().messages.last().cloned().unwrap();
        assert_eq!(
            last.content,
            "[Tool Result from nope]: Error: Unknown tool 'nope'. Available: echo"
        );
    }

    #[tokio::test]
    async fn exhaustion_message() {
        let provider = ScriptedProvider::repeating("Again [TOOL:echo]x[/TOOL]");
        let registry = registry();
        let outcome = run_loop(
            &env(&provider, &registry, None),
            vec![Message::user("hi")],
            &RecursionContext::root(2, 4),
        )
        .await;
        assert!(outcome.exhausted);
        assert_eq!(provider.call_count(), 4);
        assert!(outcome
            .answer
            .ends_with("Reached maximum iterations (4). Last response: Again [TOOL:echo]x[/TOOL]..."));
    }

    #[tokio::test]
    async fn empty_responses_end_in_apology() {
        let provider = ScriptedProvider::repeating("[THINKING]hmm[/THINKING]");
        let registry = registry();
        let outcome = run_loop(
            &env(&provider, &registry, None),
            vec![Message::user("hi")],
            &RecursionContext::root(2, 3),
        )
        .await;
        assert_eq!(outcome.answer, EMPTY_ANSWER);
        assert!(outcome.exhausted);
    }

    #[tokio::test]
    async fn provider_failure_becomes_answer() {
        let provider = ScriptedProvider::failing("connection refused");
        let registry = registry();
        let outcome = run_loop(
            &env(&provider, &registry, None),
            vec![Message::user("hi")],
            &RecursionContext::root(2, 10),
        )
        .await;
        assert!(outcome
            .answer
            .starts_with("Sorry, I couldn't reach the language model:"));
        assert!(outcome.answer.contains("connection refused"));
    }

    #[tokio::test]
    async fn steering_injected_every_third_iteration() {
        let provider = ScriptedProvider::new(vec![
            "[TOOL:echo]1[/TOOL]",
            "[TOOL:echo]2[/TOOL]",
            "[TOOL:echo]3[/TOOL]",
            "done",
        ]);
        let registry = registry();
        run_loop(
            &env(&provider, &registry, None),
            vec![Message::user("hi")],
            &RecursionContext::root(2, 10),
        )
        .await;

        let third = provider.request(2).unwrap();
        assert!(third.messages.iter().all(|m| m.content != STEERING_PROMPT));
        let fourth = provider.request(3).unwrap();
        assert_eq!(fourth.messages.last().unwrap().content, STEERING_PROMPT);
    }

    #[tokio::test]
    async fn memory_written_once_and_stripped() {
        let provider = ScriptedProvider::new(vec![
            "[MEMORY_UPDATE]- likes tea[/MEMORY_UPDATE][TOOL:echo]x[/TOOL]",
            "[MEMORY_UPDATE]- likes coffee[/MEMORY_UPDATE]Noted.",
        ]);
        let registry = registry();
        let store = InMemoryStore::new();
        let outcome = run_loop(
            &env(&provider, &registry, Some(&store as &dyn MemoryStore)),
            vec![Message::user("hi")],
            &RecursionContext::root(2, 10),
        )
        .await;
        assert_eq!(outcome.answer, "Noted.");
        assert_eq!(outcome.memory, Some(WriteOutcome::Written));
        assert_eq!(store.read().await.unwrap(), "- likes tea");
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn events_in_order() {
        let provider = ScriptedProvider::new(vec![
            "[THINKING]need echo[/THINKING]One moment. [TOOL:echo]hi[/TOOL]",
            "Done.",
        ]);
        let registry = registry();
        let (observer, mut rx) = ChannelObserver::new();
        let ctx = RecursionContext::root(2, 10).with_observer(Arc::new(observer));
        run_loop(&env(&provider, &registry, None), vec![Message::user("hi")], &ctx).await;

        let mut kinds = Vec::new();
        let mut visible = String::new();
        while let Ok(event) = rx.try_recv() {
            if let EventKind::AssistantChunk { content } = &event.kind {
                visible.push_str(content);
            } else {
                kinds.push(event.kind.event_type());
            }
        }
        assert_eq!(kinds, vec!["reasoning_progress", "tool_start", "tool_result"]);
        assert_eq!(visible, "One moment. Done.");
    }

    fn streamed_text(rx: &mut tokio::sync::mpsc::UnboundedReceiver<smore_core::event::SessionEvent>) -> String {
        let mut visible = String::new();
        while let Ok(event) = rx.try_recv() {
            if let EventKind::AssistantChunk { content } = event.kind {
                visible.push_str(&content);
            }
        }
        visible
    }

    #[tokio::test]
    async fn fallback_answers_are_streamed() {
        let registry = registry();

        let provider = ScriptedProvider::failing("connection refused");
        let (observer, mut rx) = ChannelObserver::new();
        let ctx = RecursionContext::root(2, 10).with_observer(Arc::new(observer));
        let outcome = run_loop(&env(&provider, &registry, None), vec![Message::user("hi")], &ctx).await;
        assert_eq!(streamed_text(&mut rx), outcome.answer);

        let provider = ScriptedProvider::repeating("[TOOL:echo]x[/TOOL]");
        let (observer, mut rx) = ChannelObserver::new();
        let ctx = RecursionContext::root(2, 2).with_observer(Arc::new(observer));
        let outcome = run_loop(&env(&provider, &registry, None), vec![Message::user("hi")], &ctx).await;
        let visible = streamed_text(&mut rx);
        assert!(visible.starts_with("Reached maximum iterations (2)."));
        assert_eq!(visible, outcome.answer);

        let provider = ScriptedProvider::repeating("[THINKING]hmm[/THINKING]");
        let (observer, mut rx) = ChannelObserver::new();
        let ctx = RecursionContext::root(2, 2).with_observer(Arc::new(observer));
        run_loop(&env(&provider, &registry, None), vec![Message::user("hi")], &ctx).await;
        assert_eq!(streamed_text(&mut rx), EMPTY_ANSWER);
    }

    #[tokio::test]
    async fn fallback_not_streamed_when_not_streaming() {
        let provider = ScriptedProvider::failing("down");
        let registry = registry();
        let mut env = env(&provider, &registry, None);
        env.streaming = false;
        let (observer, mut rx) = ChannelObserver::new();
        let ctx = RecursionContext::root(2, 10).with_observer(Arc::new(observer));
        run_loop(&env, vec![Message::user("hi")], &ctx).await;
        assert_eq!(streamed_text(&mut rx), "");
    }

    #[tokio::test]
    async fn rejected_update_does_not_block_a_later_one() {
        let big = format!("[MEMORY_UPDATE]{}[/MEMORY_UPDATE][TOOL:echo]x[/TOOL]", "y".repeat(50));
        let provider = ScriptedProvider::new(vec![
            big.as_str(),
            "[MEMORY_UPDATE]- short[/MEMORY_UPDATE]Saved.",
        ]);
        let registry = registry();
        let store = InMemoryStore::new().with_max_chars(20);
        let outcome = run_loop(
            &env(&provider, &registry, Some(&store as &dyn MemoryStore)),
            vec![Message::user("hi")],
            &RecursionContext::root(2, 10),
        )
        .await;
        assert_eq!(outcome.answer, "Saved.");
        assert_eq!(outcome.memory, Some(WriteOutcome::Written));
        assert_eq!(store.read().await.unwrap(), "- short");
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn preview_truncates() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(250);
        let p = preview(&long);
        assert_eq!(p.len(), 203);
        assert!(p.ends_with("..."));
    }
}
