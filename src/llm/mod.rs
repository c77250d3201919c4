//! Model boundary
//!
//! Everything that talks to a hosted model goes through [`CompletionBackend`].
//! The production implementation is [`OpenAiBackend`]; tests substitute their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

mod openai;

pub use openai::OpenAiBackend;

/// Speaker of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The person asking
    User,
    /// The model
    Assistant,
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who said it
    pub role: ChatRole,
    /// What was said
    pub content: String,
}

impl ChatMessage {
    /// A user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// A model turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Text completion against a hosted model
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Sends a system prompt and the conversation so far, returning the model's reply
    async fn complete(&self, model: &str, system: &str, messages: &[ChatMessage]) -> Result<String>;
}
