//! Request and response types for the Ollama chat API

use serde::{Deserialize, Serialize};

/// A chat message
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling options forwarded to the model
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Maximum tokens to generate (`num_predict` on the wire).
    #[serde(rename = "num_predict", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Chat completion request
#[derive(Clone, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub options: ChatOptions,
    /// System prompt, folded into a leading system message on the wire.
    pub system: Option<String>,
    /// Constrained output format, e.g. "json". Callers must still validate:
    /// the server is not trusted to honor it.
    pub format: Option<String>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn json_format(mut self) -> Self {
        self.format = Some("json".to_string());
        self
    }
}

/// Chat completion response
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
}

impl ChatResponse {
    pub fn content(&self) -> &str {
        &self.message.content
    }
}

/// Streaming delta
#[derive(Clone, Debug, PartialEq)]
pub enum StreamDelta {
    /// A chunk of generated text.
    Token(String),
    /// Final chunk; the stream ends after this.
    Done { total_duration: Option<u64> },
}
