//! Error types for codeforge

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("tool error: {name} - {message}")]
    Tool { name: String, message: String },

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plan error: {0}")]
    Plan(String),

    #[error("safety error: {0}")]
    Safety(String),

    #[error("model error: {0}")]
    Model(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn tool(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn plan(message: impl Into<String>) -> Self {
        Self::Plan(message.into())
    }

    pub fn safety(message: impl Into<String>) -> Self {
        Self::Safety(message.into())
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }

    /// Whether the orchestrator may retry the failed operation.
    /// Io failures get one retry; everything else is surfaced as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
