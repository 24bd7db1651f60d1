//! Claude Messages API integration for the shopping assistant.
//!
//! The agent never talks to [`ClaudeClient`] directly. It goes through the
//! [`LanguageModel`] trait so tests can substitute a scripted model.

mod client;
mod error;
mod types;

pub use client::ClaudeClient;
pub use error::{ApiError, ApiErrorResponse, ClaudeError};
pub use types::*;

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of server-sent events for one model turn.
pub type EventStream = BoxStream<'static, Result<StreamEvent, ClaudeError>>;

/// A single request to the model: instructions, history and tool definitions.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// System prompt.
    pub system: String,
    /// Conversation so far, in the model's message format.
    pub messages: Vec<Message>,
    /// Tool definitions the model may call.
    pub tools: Vec<Tool>,
}

/// A streaming chat model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Open a streaming turn.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be started. Failures after
    /// the first byte arrive as `Err` items on the stream instead.
    async fn stream(&self, request: ModelRequest) -> Result<EventStream, ClaudeError>;
}
