//! Scripted completion client for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::api::{ChatRequest, ChatResponse};
use crate::core::chat_stream::{CompletionClient, CompletionStream, SseStream, StreamError};
use crate::core::session::SessionError;

pub enum Step {
    /// A frame whose first choice carries this content
    Delta(&'static str),
    /// A raw JSON frame
    Frame(&'static str),
    /// A read error
    Fail(&'static str),
    /// The worker panics while reading
    Panic,
}

/// What the next `open_stream` call returns.
pub enum Opening {
    Script(Vec<Step>),
    /// Raw SSE chunks decoded by the real `SseStream`
    Sse(Vec<&'static str>),
    Refuse(u16),
}

pub struct ScriptedStream {
    steps: VecDeque<Step>,
    releases: Arc<AtomicUsize>,
}

#[async_trait]
impl CompletionStream for ScriptedStream {
    async fn next_frame(&mut self) -> Result<Option<ChatResponse>, StreamError> {
        match self.steps.pop_front() {
            None => Ok(None),
            Some(Step::Delta(text)) => {
                let raw = serde_json::json!({
                    "choices": [{"delta": {"role": "assistant", "content": text}}]
                });
                Ok(Some(serde_json::from_value(raw).expect("valid frame")))
            }
            Some(Step::Frame(raw)) => Ok(Some(serde_json::from_str(raw).expect("valid frame"))),
            Some(Step::Fail(msg)) => Err(StreamError::Transport(msg.to_string())),
            Some(Step::Panic) => panic!("scripted stream panicked"),
        }
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Returns one scripted opening per request and records every request.
#[derive(Default)]
pub struct ScriptedClient {
    openings: Mutex<VecDeque<Opening>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    releases: Arc<AtomicUsize>,
}

impl ScriptedClient {
    pub fn new(openings: Vec<Opening>) -> Self {
        Self {
            openings: Mutex::new(openings.into()),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<ChatRequest>>> {
        self.requests.clone()
    }

    /// Count of scripted streams dropped so far.
    pub fn releases(&self) -> Arc<AtomicUsize> {
        self.releases.clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<Box<dyn CompletionStream>, SessionError> {
        self.requests.lock().unwrap().push(request.clone());
        let opening = self.openings.lock().unwrap().pop_front();
        match opening.expect("unexpected request") {
            Opening::Script(steps) => Ok(Box::new(ScriptedStream {
                steps: steps.into(),
                releases: self.releases.clone(),
            })),
            Opening::Sse(chunks) => {
                let chunks: Vec<Result<&'static str, String>> =
                    chunks.into_iter().map(Ok).collect();
                Ok(Box::new(SseStream::new(futures_util::stream::iter(chunks))))
            }
            Opening::Refuse(status) => Err(SessionError::Api {
                status,
                message: "API Error:\n```\nunauthorized\n```".to_string(),
            }),
        }
    }
}
