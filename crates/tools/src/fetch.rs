//! `fetch_webpage`: download a page and reduce it to readable text.
//!
//! Only public http(s) URLs are accepted: localhost and private,
//! loopback or link-local addresses are refused before any request.

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::{Client, Url};
use smore_core::error::ToolError;
use smore_core::tool::{Tool, ToolContext};
use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;
use crate::USER_AGENT;

const FETCH_TIMEOUT_SECS: u64 = 10;
const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;
const MAX_TEXT_CHARS: usize = 3000;
const ALLOWED_TYPES: &[&str] = &[
    "text/html",
    "text/plain",
    "application/json",
    "application/xml",
    "text/xml",
];

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n").expect("blank-line regex"));
static NOISE_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|nav|footer|header|aside|noscript)\b.*?</(script|style|nav|footer|header|aside|noscript)>")
        .expect("noise regex")
});

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}

/// Check that `raw` is a public http(s) URL.
pub fn validate_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("Invalid URL: {e}"))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!(
            "Invalid protocol: {}. Only HTTP/HTTPS allowed",
            url.scheme()
        ));
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| "Invalid URL: no hostname".to_string())?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_lowercase();

    if host == "localhost" || host.ends_with(".localhost") {
        return Err("Security: Cannot access localhost".into());
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if ip.is_loopback() || ip.is_unspecified() {
            return Err("Security: Cannot access localhost".into());
        }
        if is_private_ip(ip) {
            return Err(format!("Security: Cannot access private IP addresses ({host})"));
        }
    }

    Ok(url)
}

/// Reduce an HTML document to wrapped plain text.
fn html_to_text(html: &str) -> String {
    let stripped = NOISE_BLOCKS.replace_all(html, "");
    match from_read(stripped.as_bytes(), 120) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => crate::strip_tags(&stripped),
    }
}

/// Collapse blank runs and cap the length.
pub fn tidy_text(text: &str) -> String {
    let collapsed = BLANK_RUNS.replace_all(text, "\n\n");
    let trimmed = collapsed.trim();
    if trimmed.chars().count() > MAX_TEXT_CHARS {
        let head: String = trimmed.chars().take(MAX_TEXT_CHARS).collect();
        format!("{head}\n\n... [Content truncated at {MAX_TEXT_CHARS} characters]")
    } else {
        trimmed.to_string()
    }
}

pub struct FetchWebpageTool {
    client: Client,
}

impl FetchWebpageTool {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    async fn fetch(&self, url: Url) -> Result<String, String> {
        let shown = url.to_string();
        debug!(url = %shown, "Fetching webpage");

        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                format!("Request timed out after {FETCH_TIMEOUT_SECS} seconds for {shown}")
            } else {
                format!("Failed to fetch {shown}: {e}")
            }
        })?;

        if !resp.status().is_success() {
            return Err(format!("HTTP {} for {shown}", resp.status().as_u16()));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !ALLOWED_TYPES.iter().any(|t| content_type.contains(t)) {
            return Err(format!(
                "Unsupported content type: {content_type}. Only text-based content allowed."
            ));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| format!("Failed to fetch {shown}: {e}"))?;
        if bytes.len() > MAX_BODY_BYTES {
            return Err(format!(
                "Content too large ({} bytes). Maximum 5MB allowed.",
                bytes.len()
            ));
        }

        let body = String::from_utf8_lossy(&bytes);
        let text = if content_type.contains("html") {
            html_to_text(&body)
        } else {
            body.into_owned()
        };

        let text = tidy_text(&text);
        if text.is_empty() {
            return Err("No text content found on page".into());
        }
        Ok(format!("Content from {shown}:\n\n{text}"))
    }
}

impl Default for FetchWebpageTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FetchWebpageTool {
    fn name(&self) -> &str {
        "fetch_webpage"
    }

    fn description(&self) -> &str {
        "Fetch and read content from a webpage. Params: URL (e.g., 'https://example.com/article')"
    }

    async fn invoke(&self, params: &str, _ctx: ToolContext<'_>) -> Result<String, ToolError> {
        let raw = params.trim();
        if raw.is_empty() {
            return Ok("Error: URL cannot be empty".into());
        }
        let url = match validate_url(raw) {
            Ok(url) => url,
            Err(e) => return Ok(format!("Error: {e}")),
        };
        Ok(self.fetch(url).await.unwrap_or_else(|e| format!("Error: {e}")))
    }
}
