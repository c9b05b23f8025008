//! `web_search` and `quick_search`: DuckDuckGo-backed internet search.
//!
//! Queries the DuckDuckGo HTML endpoint and scrapes result anchors out of
//! the page. Params are `query` or `query|max_results`.

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};
use smore_core::error::ToolError;
use smore_core::tool::{Tool, ToolContext};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;
use crate::{decode_entities, truncate_chars, USER_AGENT};

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const DEFAULT_MAX_RESULTS: usize = 5;
const MAX_RESULTS_CAP: usize = 20;
const OUTPUT_LIMIT: usize = 1500;

static RESULT_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a\s([^>]*class="result__a"[^>]*)>(.*?)</a>"#).expect("result anchor regex")
});
static SNIPPET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<(?:a|div|td)\s[^>]*class="result__snippet"[^>]*>(.*?)</(?:a|div|td)>"#)
        .expect("snippet regex")
});
static HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="([^"]*)""#).expect("href regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Split `query|max_results`, clamping the count to 1..=20.
///
/// A suffix that is not a number is treated as part of the query.
pub fn parse_params(params: &str) -> Option<(String, usize)> {
    let params = params.trim();
    if params.is_empty() {
        return None;
    }
    if let Some((query, count)) = params.rsplit_once('|')
        && let Ok(count) = count.trim().parse::<i64>()
    {
        let count = count.clamp(1, MAX_RESULTS_CAP as i64) as usize;
        return Some((query.trim().to_string(), count));
    }
    Some((params.to_string(), DEFAULT_MAX_RESULTS))
}

fn clean_fragment(fragment: &str) -> String {
    let text = TAG.replace_all(fragment, "");
    decode_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve DuckDuckGo's `/l/?uddg=` redirect links to the target URL.
fn resolve_link(href: &str) -> String {
    let href = decode_entities(href);
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.clone()
    };
    Url::parse(&absolute)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(href)
}

/// Extract hits from a DuckDuckGo HTML results page.
pub fn parse_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let anchors: Vec<_> = RESULT_ANCHOR.captures_iter(html).collect();
    let mut hits = Vec::new();

    for (i, caps) in anchors.iter().enumerate() {
        let (Some(whole), Some(attrs), Some(title)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let Some(href) = HREF.captures(attrs.as_str()).and_then(|c| c.get(1)) else {
            continue;
        };

        // The snippet sits between this anchor and the next one.
        let segment_end = anchors
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(html.len(), |m| m.start());
        let snippet = SNIPPET
            .captures(&html[whole.end()..segment_end])
            .and_then(|c| c.get(1))
            .map(|m| clean_fragment(m.as_str()))
            .unwrap_or_default();

        hits.push(SearchHit {
            title: clean_fragment(title.as_str()),
            url: resolve_link(href.as_str()),
            snippet,
        });
        if hits.len() >= max_results {
            break;
        }
    }
    hits
}

/// Thin client for the DuckDuckGo HTML endpoint.
pub struct DuckDuckGo {
    client: Client,
    endpoint: String,
}

impl DuckDuckGo {
    pub fn new() -> Self {
        Self::with_endpoint(SEARCH_URL)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, String> {
        debug!(query = %query, max_results, "Searching DuckDuckGo");
        let resp = self
            .client
            .post(&self.endpoint)
            .form(&[("q", query), ("kp", "-1")])
            .send()
            .await
            .map_err(|e| format!("Request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let html = resp.text().await.map_err(|e| format!("Read body: {e}"))?;
        Ok(parse_results(&html, max_results))
    }
}

impl Default for DuckDuckGo {
    fn default() -> Self {
        Self::new()
    }
}

/// Detailed results: title, snippet and URL for each hit.
pub fn format_detailed(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No search results found for: {query}");
    }
    let mut out = vec![format!("Search results for '{query}':\n")];
    for (i, hit) in hits.iter().enumerate() {
        let snippet = if hit.snippet.is_empty() { "No description" } else { &hit.snippet };
        out.push(format!("{}. {}", i + 1, truncate_chars(&hit.title, 60)));
        out.push(format!("   {}", truncate_chars(snippet, 150)));
        out.push(format!("   URL: {}\n", hit.url));
    }
    let text = out.join("\n");
    if text.chars().count() > OUTPUT_LIMIT {
        let head: String = text.chars().take(OUTPUT_LIMIT).collect();
        format!("{head}\n... [results truncated]")
    } else {
        text
    }
}

/// Titles and URLs only.
pub fn format_quick(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No results for: {query}");
    }
    let mut out = vec![format!("Quick results for '{query}':\n")];
    for (i, hit) in hits.iter().enumerate() {
        out.push(format!("{}. {} - {}", i + 1, truncate_chars(&hit.title, 50), hit.url));
    }
    out.join("\n")
}

pub struct WebSearchTool {
    engine: Arc<DuckDuckGo>,
}

impl WebSearchTool {
    pub fn new(engine: Arc<DuckDuckGo>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the internet for information. Params: query or query|max_results (e.g., 'python async' or 'AI news|10')"
    }

    async fn invoke(&self, params: &str, _ctx: ToolContext<'_>) -> Result<String, ToolError> {
        let Some((query, max_results)) = parse_params(params) else {
            return Ok("Error: Search query cannot be empty".into());
        };
        Ok(match self.engine.search(&query, max_results).await {
            Ok(hits) => format_detailed(&query, &hits),
            Err(e) => format!("Error searching web: {e}"),
        })
    }
}

pub struct QuickSearchTool {
    engine: Arc<DuckDuckGo>,
}

impl QuickSearchTool {
    pub fn new(engine: Arc<DuckDuckGo>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for QuickSearchTool {
    fn name(&self) -> &str {
        "quick_search"
    }

    fn description(&self) -> &str {
        "Quick internet search returning only titles and URLs. Params: query or query|max_results"
    }

    async fn invoke(&self, params: &str, _ctx: ToolContext<'_>) -> Result<String, ToolError> {
        let Some((query, max_results)) = parse_params(params) else {
            return Ok("Error: Search query cannot be empty".into());
        };
        Ok(match self.engine.search(&query, max_results).await {
            Ok(hits) => format_quick(&query, &hits),
            Err(e) => format!("Error: {e}"),
        })
    }
}
