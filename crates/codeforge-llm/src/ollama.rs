//! Ollama chat provider with NDJSON streaming

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{ChatMessage, ChatOptions, ChatRequest, ChatResponse, StreamDelta};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        // Trailing slashes double up when joined with /api/... paths
        while self.base_url.ends_with('/') {
            self.base_url.pop();
        }
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    async fn send(&self, request: &ChatRequest, stream: bool) -> LlmResult<reqwest::Response> {
        let body = OllamaChatRequest::from_request(request, stream);
        debug!("ollama request: model={} stream={}", body.model, stream);

        let response = self
            .client
            .post(self.chat_url())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("ollama error {}: {}", status, error_text);
            return Err(LlmError::RequestFailed(format!(
                "{}: {}",
                status, error_text
            )));
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: ChatRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<ChatResponse> {
        let cancel = cancel.unwrap_or_default();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            r = self.send(&request, false) => r?,
        };

        let parsed: OllamaChatResponse = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            body = response.json::<OllamaChatResponse>() => {
                body.map_err(|e| LlmError::InvalidResponse(e.to_string()))?
            }
        };

        Ok(parsed.into_response())
    }

    async fn complete_stream(
        &self,
        request: ChatRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<LlmStream> {
        let cancel = cancel.unwrap_or_default();
        let response = self.send(&request, true).await?;
        let stream = parse_ndjson_stream(response.bytes_stream(), cancel);
        Ok(Box::pin(stream))
    }

    async fn test_connection(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                debug!("ollama health check failed: {}", e);
                false
            }
        }
    }
}

/// Parse an NDJSON chat stream into deltas. Lines may be split across
/// transport chunks, so incomplete tails are buffered. Cancellation drops
/// the HTTP connection and yields `LlmError::Cancelled`.
fn parse_ndjson_stream(
    bytes_stream: impl futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    cancel: CancellationToken,
) -> impl futures::Stream<Item = LlmResult<StreamDelta>> + Send {
    async_stream::stream! {
        let mut buffer = String::new();
        tokio::pin!(bytes_stream);

        loop {
            let chunk_result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    yield Err(LlmError::Cancelled);
                    return;
                }
                chunk = bytes_stream.next() => chunk,
            };

            let chunk = match chunk_result {
                Some(Ok(c)) => c,
                Some(Err(e)) => {
                    yield Err(LlmError::StreamError(e.to_string()));
                    continue;
                }
                None => break,
            };

            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer = buffer[newline + 1..].to_string();
                if line.is_empty() {
                    continue;
                }
                match parse_chat_line(&line) {
                    Ok(Some(delta)) => {
                        let done = matches!(delta, StreamDelta::Done { .. });
                        yield Ok(delta);
                        if done {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => yield Err(e),
                }
            }
        }

        // Servers normally end with a done:true line; tolerate truncation.
        let tail = buffer.trim();
        if !tail.is_empty() {
            match parse_chat_line(tail) {
                Ok(Some(delta)) => yield Ok(delta),
                Ok(None) => {}
                Err(e) => yield Err(e),
            }
        }
    }
}

/// One NDJSON line → a delta, or `None` for an empty keep-alive chunk.
fn parse_chat_line(line: &str) -> LlmResult<Option<StreamDelta>> {
    let parsed: OllamaChatResponse = serde_json::from_str(line)
        .map_err(|e| LlmError::InvalidResponse(format!("bad stream line: {}", e)))?;
    if parsed.done {
        return Ok(Some(StreamDelta::Done {
            total_duration: parsed.total_duration,
        }));
    }
    let content = parsed.message.map(|m| m.content).unwrap_or_default();
    if content.is_empty() {
        return Ok(None);
    }
    Ok(Some(StreamDelta::Token(content)))
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    options: ChatOptions,
}

impl OllamaChatRequest {
    fn from_request(request: &ChatRequest, stream: bool) -> Self {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.extend(request.messages.iter().cloned());
        Self {
            model: request.model.clone(),
            messages,
            stream,
            format: request.format.clone(),
            options: request.options.clone(),
        }
    }
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    total_duration: Option<u64>,
}

impl OllamaChatResponse {
    fn into_response(self) -> ChatResponse {
        ChatResponse {
            message: self
                .message
                .unwrap_or_else(|| ChatMessage::assistant(String::new())),
            done: self.done,
            total_duration: self.total_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_token_line() {
        let line = r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#;
        let delta = parse_chat_line(line).unwrap().unwrap();
        assert_eq!(delta, StreamDelta::Token("Hel".to_string()));
    }

    #[test]
    fn parse_done_line() {
        let line = r#"{"done":true,"total_duration":123456}"#;
        let delta = parse_chat_line(line).unwrap().unwrap();
        assert_eq!(
            delta,
            StreamDelta::Done {
                total_duration: Some(123456)
            }
        );
    }

    #[test]
    fn parse_empty_content_is_keepalive() {
        let line = r#"{"message":{"role":"assistant","content":""},"done":false}"#;
        assert_eq!(parse_chat_line(line).unwrap(), None);
    }

    #[test]
    fn parse_garbage_is_invalid_response() {
        assert!(matches!(
            parse_chat_line("not json"),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn request_folds_system_into_leading_message() {
        let request = ChatRequest::new("llama3.2")
            .with_system("be terse")
            .with_message(ChatMessage::user("hi"));
        let wire = OllamaChatRequest::from_request(&request, true);
        assert_eq!(wire.messages.len(), 2);
        assert_eq!(wire.messages[0].role, "system");
        assert_eq!(wire.messages[1].role, "user");
        assert!(wire.stream);
    }

    #[test]
    fn request_serializes_num_predict() {
        let mut request = ChatRequest::new("m");
        request.options.max_tokens = Some(512);
        let wire = OllamaChatRequest::from_request(&request, false);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["options"]["num_predict"], 512);
        assert!(json["options"].get("temperature").is_none());
    }
}
