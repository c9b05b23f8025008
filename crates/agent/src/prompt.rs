//! System prompt assembly for the top-level loop.

use crate::protocol::{MEMORY_CLOSE, MEMORY_OPEN, THINKING_CLOSE, THINKING_OPEN, TOOL_CLOSE};

/// Injected every few iterations when the model keeps calling tools.
pub const STEERING_PROMPT: &str = "You have been using tools for several steps. \
Check whether you are making progress toward answering the user. \
If you are repeating calls or the results are not helping, change your approach \
or answer with what you already have.";

/// Compose the top-level system prompt.
///
/// `tools` is the registry description for depth 0; `memory` is the current
/// long-term notes document (possibly empty).
pub fn system_prompt(base: &str, tools: &str, memory: &str, memory_max_chars: usize) -> String {
    let notes = if memory.trim().is_empty() {
        "(no notes yet)"
    } else {
        memory.trim()
    };

    format!(
        "{base}\n\n\
         ## Available Tools\n\
         {tools}\n\n\
         To use a tool, reply with [TOOL:tool_name]parameters{TOOL_CLOSE} and stop. \
         Use one tool per reply; the result will be sent back to you.\n\
         To think before answering, wrap private notes in {THINKING_OPEN}...{THINKING_CLOSE}. \
         The user never sees them.\n\n\
         ## Memory\n\
         {notes}\n\n\
         To change your long-term notes, include the complete new document in \
         {MEMORY_OPEN}...{MEMORY_CLOSE} (at most {memory_max_chars} characters)."
    )
}
