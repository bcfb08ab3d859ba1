//! LLM Provider trait

use crate::types::{ChatRequest, ChatResponse, StreamDelta};
use futures::Stream;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// LLM error types
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl From<LlmError> for codeforge_core::Error {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Cancelled => codeforge_core::Error::Cancelled,
            other => codeforge_core::Error::Model(other.to_string()),
        }
    }
}

/// Stream type for LLM responses
pub type LlmStream = Pin<Box<dyn Stream<Item = LlmResult<StreamDelta>> + Send>>;

/// LLM Provider trait
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Default model served by this provider.
    fn model(&self) -> &str;

    /// Complete a chat request and return the full response.
    /// If `cancel` is provided and triggered, the request is aborted and
    /// `LlmError::Cancelled` is returned.
    async fn complete(
        &self,
        request: ChatRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<ChatResponse>;

    /// Stream a completion. Each yielded delta is a suspension point, so
    /// cancellation is observable within one chunk.
    async fn complete_stream(
        &self,
        request: ChatRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<LlmStream>;

    /// Health check against the inference server.
    async fn test_connection(&self) -> bool;
}
