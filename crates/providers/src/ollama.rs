//! Ollama provider: native `/api/chat` endpoint.
//!
//! Streaming responses are newline-delimited JSON objects, each carrying a
//! `message.content` fragment; the last one has `"done": true`.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use smore_core::error::ProviderError;
use smore_core::message::Message;
use smore_core::provider::{ChatRequest, ChunkReceiver, StreamChunk};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use crate::http::{build_client, check_status, LineBuffer};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: build_client(),
        }
    }

    fn body(request: &ChatRequest, stream: bool) -> ChatBody<'_> {
        ChatBody {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|m: &Message| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream,
            options: Options {
                temperature: request.temperature,
            },
        }
    }

    async fn post(&self, body: &ChatBody<'_>) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        check_status("ollama", response).await
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_URL)
    }
}

/// Turn one NDJSON line into a chunk. Unparseable lines are skipped.
fn parse_line(line: &str) -> Option<StreamChunk> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<ChatLine>(line) {
        Ok(parsed) if parsed.done => Some(StreamChunk::end()),
        Ok(parsed) => parsed
            .message
            .map(|m| m.content)
            .filter(|c| !c.is_empty())
            .map(StreamChunk::text),
        Err(e) => {
            trace!(error = %e, line = %line, "Ignoring unparseable Ollama line");
            None
        }
    }
}

#[async_trait]
impl smore_core::Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, ProviderError> {
        debug!(model = %request.model, "Sending Ollama chat request");
        let response = self.post(&Self::body(&request, false)).await?;
        let parsed: ChatLine = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;
        Ok(parsed.message.map(|m| m.content).unwrap_or_default())
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkReceiver, ProviderError> {
        debug!(model = %request.model, messages = request.messages.len(), "Sending Ollama streaming request");
        let response = self.post(&Self::body(&request, true)).await?;

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = LineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };
                buffer.push(&bytes);

                for line in buffer.drain_lines() {
                    let Some(chunk) = parse_line(&line) else {
                        continue;
                    };
                    let done = chunk.done;
                    if tx.send(Ok(chunk)).await.is_err() || done {
                        return;
                    }
                }
            }

            // Connection closed without a done line; flush what is left
            if let Some(chunk) = parse_line(&buffer.remainder())
                && !chunk.done
            {
                let _ = tx.send(Ok(chunk)).await;
            }
            let _ = tx.send(Ok(StreamChunk::end())).await;
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

// --- Ollama wire types (internal) ---

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatLine {
    #[serde(default)]
    message: Option<LineMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct LineMessage {
    #[serde(default)]
    content: String,
}
