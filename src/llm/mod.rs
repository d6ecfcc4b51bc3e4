//! Language-model client seam.
//!
//! Operators never talk to a provider directly. They hand a [`CompletionRequest`] to a
//! [`LanguageModelClient`] and get back a JSON payload that is then validated against the
//! requested [`MessageFormat`]. Vendor transports implement the trait outside this crate;
//! [`ScriptedClient`] ships here for demos and tests.

pub mod error;
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::message::MessageFormat;

pub use error::LLMError;
pub use scripted::ScriptedClient;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single turn of the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Everything a client needs to produce one structured completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub response_format: MessageFormat,
}

impl CompletionRequest {
    pub fn new(response_format: MessageFormat) -> Self {
        Self {
            messages: Vec::new(),
            response_format,
        }
    }

    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// JSON schema the response must satisfy.
    pub fn json_schema(&self) -> Value {
        self.response_format.json_schema()
    }

    /// Content of the system message, if one was sent.
    pub fn system(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Content of the most recent user turn.
    pub fn last_user(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// A provider able to return a structured completion.
///
/// Implementations return the raw JSON payload; schema validation happens in the operator
/// so every provider gets the same re-prompt behaviour.
#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<Value, LLMError>;
}
