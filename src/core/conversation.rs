//! Append-only conversation history.
//!
//! The remote model keeps no state between calls, so every completion
//! request carries the whole ordered history held here.

use crate::api::ChatMessage;
use crate::core::message::Message;

#[derive(Debug, Default, Clone)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message to the end of the history. There is no way to
    /// remove or edit a message afterwards.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn to_api_messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(ChatMessage::from).collect()
    }
}
