//! codeforge-llm — client for a local Ollama-compatible inference server
//!
//! `LlmProvider` is the seam the rest of the system talks through; the
//! concrete `OllamaProvider` posts to `/api/chat` and parses the NDJSON
//! stream. Tests swap in scripted providers behind the same trait.

pub mod ollama;
pub mod provider;
pub mod types;

pub use ollama::OllamaProvider;
pub use provider::{LlmError, LlmProvider, LlmResult, LlmStream};
pub use types::{ChatMessage, ChatOptions, ChatRequest, ChatResponse, StreamDelta};
