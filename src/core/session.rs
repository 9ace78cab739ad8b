//! Streaming chat session.
//!
//! A [`StreamingSession`] owns the conversation history and a completion
//! client. Each [`StreamingSession::send`] opens one streaming request and
//! spawns one worker task that drains it. The worker hands events back over
//! its own channel of capacity one, so it can never run more than a single
//! event ahead of the consumer.
//!
//! Callers must poll [`StreamingSession::recv`] (or
//! [`StreamingSession::try_recv`]) until a terminal event before calling
//! `send` again. Overlapping sends are not supported.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::ChatRequest;
use crate::core::chat_stream::{CompletionClient, CompletionStream, OpenAiClient, StreamError};
use crate::core::constants::{DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MODEL};
use crate::core::conversation::ConversationState;
use crate::core::message::Message;

/// The streaming request could not be opened.
#[derive(Debug)]
pub enum SessionError {
    /// The API key cannot be used to authenticate at all.
    InvalidCredential(String),
    /// The HTTP client could not be constructed.
    Client(reqwest::Error),
    /// The request never got a response (DNS, TLS, connection refused, timeout).
    Request(reqwest::Error),
    /// The server answered with a non-success status.
    Api { status: u16, message: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidCredential(msg) => write!(f, "Invalid API key: {msg}"),
            SessionError::Client(err) => write!(f, "Failed to create HTTP client: {err}"),
            SessionError::Request(err) => write!(f, "Failed to retrieve chat response: {err}"),
            SessionError::Api { status, message } => {
                write!(f, "Request failed with status {status}\n{message}")
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Client(err) | SessionError::Request(err) => Some(err),
            _ => None,
        }
    }
}

/// Connection settings for the completion endpoint.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub model: String,
    pub base_url: String,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Some(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)),
            read_timeout: None,
        }
    }
}

/// What a consumer sees from [`StreamingSession::recv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// An incremental piece of the assistant reply.
    PartialToken(String),
    /// The reply finished and is now the last message of the conversation.
    Done,
    /// The stream failed. Nothing was added to the conversation.
    Error(StreamError),
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Done | SessionEvent::Error(_))
    }
}

#[derive(Debug)]
enum WorkerMessage {
    Token(String),
    Finished(String),
    Failed(StreamError),
}

pub struct StreamingSession {
    client: Box<dyn CompletionClient>,
    model: String,
    conversation: ConversationState,
    /// Events of the running worker; `None` while idle
    rx: Option<mpsc::Receiver<WorkerMessage>>,
}

impl StreamingSession {
    /// Creates a session against an OpenAI-compatible endpoint. Fails only
    /// when the key or settings are unusable; no request is made here.
    pub fn new(api_key: &str, settings: &SessionSettings) -> Result<Self, SessionError> {
        let client = OpenAiClient::new(
            api_key,
            &settings.base_url,
            settings.connect_timeout,
            settings.read_timeout,
        )?;
        Ok(Self::with_client(Box::new(client), settings.model.clone()))
    }

    pub fn with_client(client: Box<dyn CompletionClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            conversation: ConversationState::new(),
            rx: None,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    /// Records the user turn and opens a streaming completion over the whole
    /// history.
    ///
    /// The user message stays in the history even when opening the stream
    /// fails. On success one worker is spawned and this returns without
    /// waiting for any reply text.
    pub async fn send(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        self.conversation.append(Message::user(text));

        let request = ChatRequest {
            model: self.model.clone(),
            messages: self.conversation.to_api_messages(),
            stream: true,
        };

        let stream = self
            .client
            .open_stream(&request)
            .await
            .inspect_err(|err| warn!(error = %err, "failed to open completion stream"))?;

        debug!(
            messages = request.messages.len(),
            model = %self.model,
            "spawning stream worker"
        );
        let (tx, rx) = mpsc::channel(1);
        self.rx = Some(rx);
        tokio::spawn(drain_stream(stream, tx));
        Ok(())
    }

    /// Waits for the next event from the running worker.
    ///
    /// Returns `Error(Disconnected)` when no reply is streaming, or when the
    /// worker ended without a terminal event.
    pub async fn recv(&mut self) -> SessionEvent {
        let Some(rx) = self.rx.as_mut() else {
            return SessionEvent::Error(StreamError::Disconnected);
        };
        let message = rx.recv().await;
        self.deliver(message)
    }

    /// Returns the next event if one is ready. Always `None` while idle.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Ok(message) => Some(self.deliver(Some(message))),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => Some(self.deliver(None)),
        }
    }

    fn deliver(&mut self, message: Option<WorkerMessage>) -> SessionEvent {
        let event = match message {
            Some(WorkerMessage::Token(fragment)) => return SessionEvent::PartialToken(fragment),
            Some(WorkerMessage::Finished(reply)) => {
                debug!(chars = reply.len(), "committing assistant reply");
                self.conversation.append(Message::assistant(reply));
                SessionEvent::Done
            }
            Some(WorkerMessage::Failed(err)) => SessionEvent::Error(err),
            None => {
                warn!("stream worker exited without a terminal event");
                SessionEvent::Error(StreamError::Disconnected)
            }
        };
        self.rx = None;
        event
    }
}

/// Reads the stream to its end, forwarding fragments as they arrive.
///
/// The stream is dropped before the terminal message is sent, on every
/// path. Partial text is discarded on error.
async fn drain_stream(mut stream: Box<dyn CompletionStream>, tx: mpsc::Sender<WorkerMessage>) {
    let mut reply = String::new();

    let terminal = loop {
        match stream.next_frame().await {
            Ok(Some(frame)) => {
                let Some(fragment) = frame.fragment() else {
                    continue;
                };
                reply.push_str(fragment);
                if tx
                    .send(WorkerMessage::Token(fragment.to_string()))
                    .await
                    .is_err()
                {
                    debug!("session dropped while streaming");
                    break None;
                }
            }
            Ok(None) => break Some(WorkerMessage::Finished(reply)),
            Err(err) => {
                warn!(error = %err, "completion stream failed");
                break Some(WorkerMessage::Failed(err));
            }
        }
    };

    drop(stream);

    if let Some(message) = terminal {
        let _ = tx.send(message).await;
    }
}
