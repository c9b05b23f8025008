//! Shared plumbing for the HTTP backends.

use smore_core::error::ProviderError;
use std::time::Duration;
use tracing::warn;

/// Long enough for a slow local model to finish a response.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Map non-success statuses onto provider errors.
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    match status {
        200..=299 => Ok(response),
        429 => Err(ProviderError::RateLimited {
            retry_after_secs: 5,
        }),
        401 | 403 => Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        404 => {
            let body = response.text().await.unwrap_or_default();
            Err(ProviderError::ModelNotFound(body))
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            warn!(provider, status, body = %body, "Provider returned error");
            Err(ProviderError::ApiError {
                status_code: status,
                message: body,
            })
        }
    }
}

/// Bytes received so far, split into lines only once a line is complete.
///
/// Network reads can end inside a multi-byte character; decoding whole
/// lines keeps such characters intact.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Remove and decode every complete line, leaving any partial tail.
    pub(crate) fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line_end) = self.bytes.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.bytes.drain(..=line_end).collect();
            let text = String::from_utf8_lossy(&line[..line_end]);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever is left after the last newline.
    pub(crate) fn remainder(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}
