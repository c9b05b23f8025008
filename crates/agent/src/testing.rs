//! Scripted provider for tests and offline demos.
//!
//! Replays canned responses in order, splitting each one into small chunks
//! so the streaming path is exercised the same way a real backend would.

use std::sync::Mutex;

use async_trait::async_trait;
use smore_core::error::ProviderError;
use smore_core::provider::{ChatRequest, ChunkReceiver, Provider, StreamChunk};
use tokio::sync::mpsc;

enum Script {
    Sequence(Vec<String>),
    Repeat(String),
    Fail(String),
}

pub struct ScriptedProvider {
    script: Script,
    chunk_chars: usize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    /// Return `responses` one per call; calling past the end is an API error.
    pub fn new(responses: Vec<&str>) -> Self {
        Self::with_script(Script::Sequence(
            responses.into_iter().map(String::from).collect(),
        ))
    }

    /// Return the same response on every call.
    pub fn repeating(response: &str) -> Self {
        Self::with_script(Script::Repeat(response.to_string()))
    }

    /// Fail every call with a network error.
    pub fn failing(message: &str) -> Self {
        Self::with_script(Script::Fail(message.to_string()))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            chunk_chars: 4,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Characters per streamed chunk (at least one).
    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars.max(1);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// The request received by the `index`-th call.
    pub fn request(&self, index: usize) -> Option<ChatRequest> {
        self.requests.lock().ok()?.get(index).cloned()
    }

    fn next_response(&self, request: ChatRequest) -> Result<String, ProviderError> {
        let mut requests = self
            .requests
            .lock()
            .map_err(|_| ProviderError::NotConfigured("scripted provider poisoned".into()))?;
        let index = requests.len();
        requests.push(request);

        match &self.script {
            Script::Sequence(responses) => {
                responses
                    .get(index)
                    .cloned()
                    .ok_or_else(|| ProviderError::ApiError {
                        status_code: 500,
                        message: format!("script exhausted after {} responses", responses.len()),
                    })
            }
            Script::Repeat(response) => Ok(response.clone()),
            Script::Fail(message) => Err(ProviderError::Network(message.clone())),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, ProviderError> {
        self.next_response(request)
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkReceiver, ProviderError> {
        let response = self.next_response(request)?;
        let chars: Vec<char> = response.chars().collect();
        let pieces: Vec<String> = chars
            .chunks(self.chunk_chars)
            .map(|c| c.iter().collect())
            .collect();

        let (tx, rx) = mpsc::channel(pieces.len() + 1);
        for piece in pieces {
            let _ = tx.try_send(Ok(StreamChunk::text(piece)));
        }
        let _ = tx.try_send(Ok(StreamChunk::end()));
        Ok(rx)
    }
}
