// Backend relay transport
//
// Every provider call goes through the application backend, which forwards
// the request to the vendor API. Adapters never talk to vendors directly.

use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use serde_json::Value;
use uuid::Uuid;

use super::error::{AiError, AiResult};

/// Relay health endpoint checked before a provider is activated
pub const HEALTH_PATH: &str = "/api/ai/health";

/// Correlation header attached to every relay request
pub const SESSION_HEADER: &str = "x-meenoe-session";

/// HTTP transport to the backend relay
pub struct ProxyTransport {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl ProxyTransport {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> AiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            session_id: format!("sess_{}", Uuid::new_v4().simple()),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Get full URL for a relay path
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Ping the relay; adapters refuse to configure while this fails
    pub async fn health_check(&self) -> AiResult<()> {
        let response = self
            .client
            .get(self.url(HEALTH_PATH))
            .header(SESSION_HEADER, &self.session_id)
            .send()
            .await
            .map_err(|e| AiError::ProxyUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AiError::ProxyUnavailable(format!(
                "health check returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// POST a JSON body and parse the JSON reply
    pub async fn post_json(
        &self,
        path: &str,
        body: &Value,
        headers: HeaderMap,
    ) -> AiResult<Value> {
        let response = self
            .client
            .post(self.url(path))
            .header(SESSION_HEADER, &self.session_id)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => AiError::AuthFailed(text),
                _ => AiError::Provider(format!("HTTP {status}: {text}")),
            });
        }

        let value = response.json::<Value>().await.map_err(|e| {
            AiError::ParseError(format!("invalid JSON from relay: {e}"))
        })?;
        Ok(value)
    }

    /// POST a JSON body and yield the response body line by line.
    ///
    /// Vendors frame streaming output on newlines (SSE `data:` lines or bare
    /// JSON objects); splitting happens here so adapters only parse lines.
    pub async fn stream_lines(
        &self,
        path: &str,
        body: &Value,
        headers: HeaderMap,
    ) -> AiResult<impl Stream<Item = AiResult<String>> + Send + Unpin> {
        let response = self
            .client
            .post(self.url(path))
            .header(SESSION_HEADER, &self.session_id)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => AiError::AuthFailed(text),
                _ => AiError::Provider(format!("HTTP {status}: {text}")),
            });
        }

        let mut bytes = response.bytes_stream();
        let stream = async_stream::try_stream! {
            let mut buffer = LineBuffer::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(AiError::from)?;
                for line in buffer.push(&chunk) {
                    yield line;
                }
            }
            if let Some(tail) = buffer.finish() {
                yield tail;
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Newline splitter over raw bytes. Chunk boundaries routinely fall inside
/// multi-byte UTF-8 characters, so decoding happens per complete line, never
/// per chunk.
struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append a chunk and return the complete lines it closed off, trimmed,
    /// empty lines dropped
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
        lines
    }

    /// Decode whatever trails the last newline
    fn finish(self) -> Option<String> {
        let tail = String::from_utf8_lossy(&self.buffer);
        let trimmed = tail.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}
