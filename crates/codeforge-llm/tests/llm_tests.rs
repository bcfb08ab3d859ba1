//! Tests for codeforge-llm: request building and message types

use codeforge_llm::*;

#[test]
fn chat_message_constructors() {
    assert_eq!(ChatMessage::system("s").role, "system");
    assert_eq!(ChatMessage::user("u").role, "user");
    assert_eq!(ChatMessage::assistant("a").role, "assistant");
}

#[test]
fn chat_request_builder() {
    let request = ChatRequest::new("qwen2.5-coder:7b")
        .with_system("you are a coding assistant")
        .with_message(ChatMessage::user("hello"))
        .json_format();
    assert_eq!(request.model, "qwen2.5-coder:7b");
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.format.as_deref(), Some("json"));
    assert!(request.system.is_some());
}

#[test]
fn chat_response_round_trip() {
    let raw = r#"{"message":{"role":"assistant","content":"TypeScript"},"done":true,"total_duration":99}"#;
    let response: ChatResponse = serde_json::from_str(raw).unwrap();
    assert_eq!(response.content(), "TypeScript");
    assert!(response.done);
    assert_eq!(response.total_duration, Some(99));

    let back = serde_json::to_string(&response).unwrap();
    let again: ChatResponse = serde_json::from_str(&back).unwrap();
    assert_eq!(response, again);
}

#[test]
fn llm_error_maps_into_core_error() {
    let core: codeforge_core::Error = LlmError::Cancelled.into();
    assert!(matches!(core, codeforge_core::Error::Cancelled));

    let core: codeforge_core::Error = LlmError::InvalidResponse("x".into()).into();
    assert!(matches!(core, codeforge_core::Error::Model(_)));
}

#[test]
fn provider_construction() {
    // Construction only; no network involved.
    let provider = OllamaProvider::new("m").with_base_url("http://localhost:11434///");
    assert_eq!(provider.model(), "m");
    assert_eq!(provider.name(), "ollama");
}
