//! Conversation history for turn-based chat
//!
//! Keeps the most recent exchanges and drops the oldest messages first once
//! the turn limit is reached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message in the conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    User,
    Model,
}

impl MessageRole {
    /// Role name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Model => "model",
        }
    }
}

/// A single message in the conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Model, content)
    }
}

/// Bounded conversation history.
///
/// Holds at most `max_turns * 2` messages. The system instruction is kept
/// apart from the history and never evicted.
#[derive(Clone, Debug)]
pub struct ConversationContext {
    system_instruction: Option<String>,
    messages: Vec<ConversationMessage>,
    max_messages: usize,
}

impl ConversationContext {
    /// Create a new conversation context keeping `max_turns` exchanges
    pub fn new(max_turns: usize) -> Self {
        Self {
            system_instruction: None,
            messages: Vec::new(),
            max_messages: max_turns.saturating_mul(2).max(1),
        }
    }

    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = instruction;
        self
    }

    pub fn system_instruction(&self) -> Option<&str> {
        self.system_instruction.as_deref()
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.add_message(ConversationMessage::user(content));
    }

    pub fn add_model_message(&mut self, content: impl Into<String>) {
        self.add_message(ConversationMessage::model(content));
    }

    fn add_message(&mut self, message: ConversationMessage) {
        self.messages.push(message);
        self.trim_to_fit();
    }

    /// Remove the newest message if it was sent by the user.
    ///
    /// Used to undo a user message whose request failed.
    pub fn pop_user_message(&mut self) -> Option<ConversationMessage> {
        match self.messages.last() {
            Some(message) if message.role == MessageRole::User => self.messages.pop(),
            _ => None,
        }
    }

    /// Get the conversation messages, oldest first
    pub fn history(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn last_user_message(&self) -> Option<&ConversationMessage> {
        self.messages.iter().rev().find(|m| m.role == MessageRole::User)
    }

    pub fn last_model_message(&self) -> Option<&ConversationMessage> {
        self.messages.iter().rev().find(|m| m.role == MessageRole::Model)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    fn trim_to_fit(&mut self) {
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
    }

    /// Export conversation to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.messages)
    }

    /// Import messages from JSON
    pub fn from_json(&mut self, json: &str) -> Result<(), serde_json::Error> {
        self.messages = serde_json::from_str(json)?;
        self.trim_to_fit();
        Ok(())
    }
}
