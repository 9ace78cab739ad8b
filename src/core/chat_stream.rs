use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use memchr::memchr;
use reqwest::header::HeaderValue;
use tracing::{debug, warn};

use crate::api::{ChatRequest, ChatResponse};
use crate::core::session::SessionError;

/// Failure while draining a stream that was already open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The connection broke while reading the body.
    Transport(String),
    /// The server sent an error payload in place of a frame.
    Api(String),
    /// No reply is streaming, or the worker ended without finishing.
    Disconnected,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Transport(msg) => write!(f, "stream interrupted: {msg}"),
            StreamError::Api(msg) => write!(f, "{msg}"),
            StreamError::Disconnected => write!(f, "no reply is streaming"),
        }
    }
}

impl std::error::Error for StreamError {}

/// An open streaming completion. Dropping it releases the underlying
/// connection.
#[async_trait]
pub trait CompletionStream: Send {
    /// Returns the next frame, `Ok(None)` at end of stream.
    async fn next_frame(&mut self) -> Result<Option<ChatResponse>, StreamError>;
}

/// The remote completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<Box<dyn CompletionStream>, SessionError>;
}

#[derive(Debug)]
enum SseLine {
    Frame(ChatResponse),
    Done,
    Skip,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn decode_sse_line(line: &str) -> Result<SseLine, StreamError> {
    let Some(payload) = extract_data_payload(line) else {
        // event:, id:, retry: and ": keep-alive" comments
        return Ok(SseLine::Skip);
    };

    if payload == "[DONE]" {
        return Ok(SseLine::Done);
    }
    if payload.trim().is_empty() {
        return Ok(SseLine::Skip);
    }

    serde_json::from_str::<ChatResponse>(payload)
        .map(SseLine::Frame)
        .map_err(|_| StreamError::Api(format_api_error(payload)))
}

/// A line that is not UTF-8 would lose part of the reply if skipped, so it
/// fails the stream.
fn decode_raw_line(raw: &[u8]) -> Result<SseLine, StreamError> {
    match std::str::from_utf8(raw) {
        Ok(line) => decode_sse_line(line.trim()),
        Err(err) => {
            warn!("Invalid UTF-8 in stream: {err}");
            Err(StreamError::Transport(format!("invalid UTF-8 in stream: {err}")))
        }
    }
}

/// Decodes a server-sent event byte stream into completion frames.
pub struct SseStream<S> {
    inner: S,
    buffer: Vec<u8>,
    finished: bool,
}

impl<S, B, E> SseStream<S>
where
    S: Stream<Item = Result<B, E>> + Send + Unpin,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            finished: false,
        }
    }

    fn take_line(&mut self) -> Option<Result<SseLine, StreamError>> {
        let newline_pos = memchr(b'\n', &self.buffer)?;
        let raw: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
        Some(decode_raw_line(&raw))
    }

    fn take_trailing_line(&mut self) -> Option<Result<SseLine, StreamError>> {
        let raw = std::mem::take(&mut self.buffer);
        if raw.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(decode_raw_line(&raw))
        }
    }
}

#[async_trait]
impl<S, B, E> CompletionStream for SseStream<S>
where
    S: Stream<Item = Result<B, E>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
    E: fmt::Display + Send,
{
    async fn next_frame(&mut self) -> Result<Option<ChatResponse>, StreamError> {
        loop {
            if self.finished {
                return Ok(None);
            }

            while let Some(line) = self.take_line() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        self.finished = true;
                        return Err(err);
                    }
                };
                match line {
                    SseLine::Frame(frame) => return Ok(Some(frame)),
                    SseLine::Done => {
                        self.finished = true;
                        return Ok(None);
                    }
                    SseLine::Skip => {}
                }
            }

            match self.inner.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(err)) => {
                    self.finished = true;
                    return Err(StreamError::Transport(err.to_string()));
                }
                None => {
                    // Connection closed without [DONE]
                    self.finished = true;
                    return match self.take_trailing_line().transpose()? {
                        Some(SseLine::Frame(frame)) => Ok(Some(frame)),
                        _ => Ok(None),
                    };
                }
            }
        }
    }
}

impl<S> Drop for SseStream<S> {
    fn drop(&mut self) {
        debug!(finished = self.finished, "releasing completion stream");
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Formats an error body from the API for display in the transcript.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            return match extract_error_summary(&json_value).filter(|s| !s.is_empty()) {
                Some(summary) => format!("API Error: {summary}\n```json\n{pretty_json}\n```"),
                None => format!("API Error:\n```json\n{pretty_json}\n```"),
            };
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{trimmed}\n```")
    } else {
        format!("API Error:\n```\n{trimmed}\n```")
    }
}

fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    /// Validates the key and builds the HTTP client. Never touches the
    /// network.
    pub fn new(
        api_key: &str,
        base_url: &str,
        connect_timeout: Option<Duration>,
        read_timeout: Option<Duration>,
    ) -> Result<Self, SessionError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(SessionError::InvalidCredential(
                "API key is empty".to_string(),
            ));
        }
        if HeaderValue::from_str(&format!("Bearer {api_key}")).is_err() {
            return Err(SessionError::InvalidCredential(
                "API key contains characters that cannot be sent in an HTTP header".to_string(),
            ));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = read_timeout {
            builder = builder.read_timeout(timeout);
        }
        let http = builder.build().map_err(SessionError::Client)?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<Box<dyn CompletionStream>, SessionError> {
        let response = self
            .http
            .post(completions_url(&self.base_url))
            .header("Content-Type", "application/json")
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(SessionError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(SessionError::Api {
                status: status.as_u16(),
                message: format_api_error(&error_text),
            });
        }

        debug!(status = status.as_u16(), model = %request.model, "completion stream opened");
        Ok(Box::new(SseStream::new(Box::pin(response.bytes_stream()))))
    }
}
