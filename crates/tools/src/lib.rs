//! Built-in tool implementations for Smore.
//!
//! Direct capabilities the assistant can call from a tool-call block:
//! the clock, arithmetic, web search and page fetching. Subagents live in
//! `smore-agent` because they run the orchestration loop themselves.

pub mod calculator;
pub mod fetch;
pub mod time;
pub mod web_search;

use smore_core::error::ToolError;
use smore_core::tool::ToolRegistry;
use std::sync::Arc;

pub use calculator::CalculatorTool;
pub use fetch::FetchWebpageTool;
pub use time::TimeTool;
pub use web_search::{DuckDuckGo, QuickSearchTool, WebSearchTool};

pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (compatible; SmoreAssistant/0.1)";

/// Register every built-in direct tool.
pub fn register_builtin(registry: &mut ToolRegistry) -> Result<(), ToolError> {
    let engine = Arc::new(DuckDuckGo::new());
    registry.register(Box::new(TimeTool))?;
    registry.register(Box::new(CalculatorTool))?;
    registry.register(Box::new(WebSearchTool::new(engine.clone())))?;
    registry.register(Box::new(QuickSearchTool::new(engine)))?;
    registry.register(Box::new(FetchWebpageTool::new()))?;
    Ok(())
}

/// Keep the first `max` characters, marking the cut with `...`.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Decode the HTML entities that show up in scraped titles and snippets.
pub(crate) fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest[1..]
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&rest[1..=end]).map(|c| (c, end + 2)));

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Crude tag stripper, used when html2text yields nothing.
pub(crate) fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    decode_entities(&out)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
