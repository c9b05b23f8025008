//! In-band tag protocol.
//!
//! The model talks to the runtime by embedding blocks in its text:
//!
//! | block          | open              | close              |
//! |----------------|-------------------|--------------------|
//! | tool call      | `[TOOL:name]`     | `[/TOOL]`          |
//! | reasoning      | `[THINKING]`      | `[/THINKING]`      |
//! | memory update  | `[MEMORY_UPDATE]` | `[/MEMORY_UPDATE]` |
//!
//! Everything here works on a completed buffer. Models regularly mangle
//! the tool-call close marker, so a second, lenient pass accepts the forms
//! listed in [`LENIENT_CLOSE_FORMS`].

pub const TOOL_OPEN: &str = "[TOOL:";
pub const TOOL_CLOSE: &str = "[/TOOL]";
pub const THINKING_OPEN: &str = "[THINKING]";
pub const THINKING_CLOSE: &str = "[/THINKING]";
pub const MEMORY_OPEN: &str = "[MEMORY_UPDATE]";
pub const MEMORY_CLOSE: &str = "[/MEMORY_UPDATE]";

/// Malformed tool-call closers accepted when no exact `[/TOOL]` is found.
/// Longest first: at a given position the longest form wins.
pub const LENIENT_CLOSE_FORMS: &[&str] = &["[/TOO]", "[/TOOL", "[/TOO"];

/// A tool invocation extracted from a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub name: String,
    pub params: String,
}

/// Byte offsets of one tool-call block.
#[derive(Debug, Clone, Copy)]
struct CallSpan {
    start: usize,
    end: usize,
    name: (usize, usize),
    params: (usize, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closer {
    Strict,
    Lenient,
}

/// Find the close marker at or after `from`, returning its byte range.
fn find_close(text: &str, from: usize, closer: Closer) -> Option<(usize, usize)> {
    let hay = &text[from..];
    match closer {
        Closer::Strict => hay
            .find(TOOL_CLOSE)
            .map(|i| (from + i, from + i + TOOL_CLOSE.len())),
        Closer::Lenient => {
            let start = LENIENT_CLOSE_FORMS.iter().filter_map(|f| hay.find(f)).min()?;
            let form = LENIENT_CLOSE_FORMS
                .iter()
                .find(|f| hay[start..].starts_with(**f))?;
            Some((from + start, from + start + form.len()))
        }
    }
}

/// First tool-call block starting at or after `from`.
///
/// Openers are tried left to right; an opener with an empty name or no
/// matching close is skipped.
fn find_call(text: &str, from: usize, closer: Closer) -> Option<CallSpan> {
    let mut search = from;
    while let Some(rel) = text[search..].find(TOOL_OPEN) {
        let start = search + rel;
        let name_start = start + TOOL_OPEN.len();
        search = start + 1;

        let Some(name_len) = text[name_start..].find(']') else {
            // No `]` anywhere after this opener, so none after later ones either
            return None;
        };
        if name_len == 0 {
            continue;
        }
        let name_end = name_start + name_len;
        let params_start = name_end + 1;

        if let Some((close_start, close_end)) = find_close(text, params_start, closer) {
            return Some(CallSpan {
                start,
                end: close_end,
                name: (name_start, name_end),
                params: (params_start, close_start),
            });
        }
    }
    None
}

/// Strict pass first, lenient pass only if the strict one finds nothing.
fn first_call(text: &str) -> Option<CallSpan> {
    find_call(text, 0, Closer::Strict).or_else(|| find_call(text, 0, Closer::Lenient))
}

/// Extract the first tool call in `text`, if any.
pub fn parse_tool_call(text: &str) -> Option<ToolCall> {
    let span = first_call(text)?;
    Some(ToolCall {
        name: text[span.name.0..span.name.1].trim().to_string(),
        params: text[span.params.0..span.params.1].trim().to_string(),
    })
}

/// Trimmed text before the first tool call, or `None` when there is no call.
pub fn preamble(text: &str) -> Option<String> {
    first_call(text).map(|span| text[..span.start].trim().to_string())
}

/// Remove every block found by one pass.
fn remove_calls(text: &str, closer: Closer) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    let mut removed = false;
    while let Some(span) = find_call(text, pos, closer) {
        out.push_str(&text[pos..span.start]);
        pos = span.end;
        removed = true;
    }
    out.push_str(&text[pos..]);
    removed.then_some(out)
}

/// Remove all tool-call blocks and trim.
pub fn strip_tool_calls(text: &str) -> String {
    let mut current = text.trim().to_string();
    loop {
        let next = remove_calls(&current, Closer::Strict)
            .or_else(|| remove_calls(&current, Closer::Lenient));
        match next {
            Some(stripped) => current = stripped.trim().to_string(),
            None => return current,
        }
    }
}

/// Content of the first `open ... close` block, trimmed.
fn extract_block(text: &str, open: &str, close: &str) -> Option<String> {
    let start = text.find(open)? + open.len();
    let len = text[start..].find(close)?;
    Some(text[start..start + len].trim().to_string())
}

/// Remove every complete `open ... close` block and trim.
fn strip_blocks(text: &str, open: &str, close: &str) -> String {
    let mut current = text.to_string();
    loop {
        let mut out = String::with_capacity(current.len());
        let mut pos = 0;
        while let Some(rel) = current[pos..].find(open) {
            let start = pos + rel;
            let Some(len) = current[start + open.len()..].find(close) else {
                break;
            };
            out.push_str(&current[pos..start]);
            pos = start + open.len() + len + close.len();
        }
        if pos == 0 {
            return current.trim().to_string();
        }
        out.push_str(&current[pos..]);
        current = out;
    }
}

pub fn parse_thinking(text: &str) -> Option<String> {
    extract_block(text, THINKING_OPEN, THINKING_CLOSE)
}

pub fn strip_thinking(text: &str) -> String {
    strip_blocks(text, THINKING_OPEN, THINKING_CLOSE)
}

pub fn parse_memory_update(text: &str) -> Option<String> {
    extract_block(text, MEMORY_OPEN, MEMORY_CLOSE)
}

pub fn strip_memory_update(text: &str) -> String {
    strip_blocks(text, MEMORY_OPEN, MEMORY_CLOSE)
}

/// Split off an opener left without its close marker.
///
/// Returns the text before the opener (trimmed) and what followed it. The
/// stream filter hides everything after such an opener, so the answer must
/// not carry it either.
fn split_unclosed<'a>(text: &'a str, open: &str) -> Option<(&'a str, &'a str)> {
    let start = text.find(open)?;
    Some((text[..start].trim(), text[start + open.len()..].trim()))
}

/// A completed model response, taken apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Candidate replacement for the long-term notes
    pub memory_update: Option<String>,
    /// First reasoning block, or the tail of an unclosed one
    pub reasoning: Option<String>,
    /// The response without memory and reasoning blocks (trimmed)
    pub text: String,
    pub tool_call: Option<ToolCall>,
    /// Text before the tool call
    pub preamble: Option<String>,
}

/// Apply the block rules in order: memory, reasoning, tool call.
///
/// An unclosed memory or reasoning block runs to the end of the response:
/// it is dropped from the text, and an unclosed memory update is never
/// offered for writing.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let memory_update = parse_memory_update(raw);
    let mut without_memory = strip_memory_update(raw);
    if let Some((head, _)) = split_unclosed(&without_memory, MEMORY_OPEN) {
        without_memory = head.to_string();
    }

    let mut reasoning = parse_thinking(&without_memory);
    let mut text = strip_thinking(&without_memory);
    if let Some((head, tail)) = split_unclosed(&text, THINKING_OPEN) {
        if reasoning.is_none() && !tail.is_empty() {
            reasoning = Some(tail.to_string());
        }
        text = head.to_string();
    }

    let tool_call = parse_tool_call(&text);
    let preamble = tool_call.as_ref().and_then(|_| preamble(&text));

    ParsedResponse {
        memory_update,
        reasoning,
        text,
        tool_call,
        preamble,
    }
}
