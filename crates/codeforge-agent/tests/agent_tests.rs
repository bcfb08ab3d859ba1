//! Tests for codeforge-agent: conversation store and the kernel's
//! route/plan/execute flow against a scripted provider

use codeforge_agent::{AgentKernel, ConversationStore, PlanState};
use codeforge_core::*;
use codeforge_llm::{
    ChatMessage, ChatRequest, ChatResponse, LlmProvider, LlmResult, LlmStream, StreamDelta,
};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Pops canned responses in order, repeating the last one.
struct ScriptedProvider {
    responses: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }
    fn model(&self) -> &str {
        "scripted-model"
    }
    async fn complete(
        &self,
        _request: ChatRequest,
        _cancel: Option<CancellationToken>,
    ) -> LlmResult<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        let content = if responses.len() > 1 {
            responses.pop().unwrap()
        } else {
            responses.last().cloned().unwrap_or_default()
        };
        Ok(ChatResponse {
            message: ChatMessage::assistant(content),
            done: true,
            total_duration: None,
        })
    }
    async fn complete_stream(
        &self,
        request: ChatRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<LlmStream> {
        let response = self.complete(request, cancel).await?;
        Ok(Box::pin(futures::stream::iter(vec![
            Ok(StreamDelta::Token(response.message.content)),
            Ok(StreamDelta::Done {
                total_duration: None,
            }),
        ])))
    }
    async fn test_connection(&self) -> bool {
        true
    }
}

const QUESTION_INTENT: &str = r#"{"type": "question", "action": "explain", "confidence": 0.9,
  "complexity": "simple", "multiStep": false, "riskLevel": "low",
  "requiresClarification": false, "estimatedDuration": 1}"#;

const EDIT_INTENT: &str = r#"{"type": "task_request", "action": "add", "confidence": 0.9,
  "complexity": "moderate", "multiStep": true, "riskLevel": "medium",
  "requiresClarification": false, "estimatedDuration": 10,
  "entities": {"files": ["src/a.js"]}}"#;

const EDIT_PLAN: &str = r#"{
  "title": "Add copyright header",
  "description": "Prepend the header to src/a.js",
  "tasks": [
    {
      "title": "Add the header",
      "description": "Prepend a copyright comment to the file",
      "type": "implementation",
      "priority": "high",
      "dependencies": [],
      "estimatedDuration": 15,
      "toolsRequired": ["filesystem"],
      "filesInvolved": ["src/a.js"],
      "acceptance_criteria": ["file starts with the header"]
    }
  ]
}"#;

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/main.ts"), "console.log('hi');\n").unwrap();
    fs::write(dir.path().join("src/a.js"), "x=1\n").unwrap();
    dir
}

async fn kernel_with(
    dir: &TempDir,
    provider: Arc<ScriptedProvider>,
    config: AssistantConfig,
) -> AgentKernel {
    AgentKernel::with_provider(config, dir.path(), provider)
        .await
        .unwrap()
}

// ===========================================================================
// Conversation store
// ===========================================================================

#[tokio::test]
async fn turns_get_monotone_ids() {
    let store = ConversationStore::new(100);
    let first = store.append_turn("s", "one", Default::default()).await;
    let second = store.append_turn("s", "two", Default::default()).await;
    let third = store.append_turn("s", "three", Default::default()).await;
    assert!(first < second && second < third);

    let recent = store.recent("s", 2).await;
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].input, "two");
    assert_eq!(recent[1].input, "three");
}

#[tokio::test]
async fn history_is_capped() {
    let store = ConversationStore::new(3);
    for i in 0..10 {
        store.append_turn("s", format!("m{}", i).as_str(), Default::default()).await;
    }
    assert_eq!(store.turn_count("s").await, 3);
    // ids keep climbing even after trimming
    assert_eq!(store.last_turn("s").await.unwrap().id, 10);
}

#[tokio::test]
async fn feedback_lands_on_the_turn() {
    let store = ConversationStore::new(10);
    let id = store.append_turn("s", "msg", Default::default()).await;
    store
        .record_feedback(
            "s",
            id,
            UserFeedback {
                rating: 4,
                helpful: true,
                accurate: true,
            },
        )
        .await
        .unwrap();
    let turn = store.last_turn("s").await.unwrap();
    assert_eq!(turn.feedback.unwrap().rating, 4);
}

#[tokio::test]
async fn persistence_round_trips() {
    let dir = TempDir::new().unwrap();
    {
        let store = ConversationStore::new(10).with_persistence(dir.path(), true);
        let id = store.append_turn("sess", "hello", Default::default()).await;
        store
            .update_turn("sess", id, |t| {
                t.response = "hi".to_string();
                t.outcome = Outcome::Success;
            })
            .await
            .unwrap();
    }
    // a fresh store reads the same turns back
    let store = ConversationStore::new(10).with_persistence(dir.path(), true);
    let turn = store.last_turn("sess").await.unwrap();
    assert_eq!(turn.input, "hello");
    assert_eq!(turn.response, "hi");
    assert_eq!(turn.outcome, Outcome::Success);
}

// ===========================================================================
// Kernel: conversational question (scenario: "what language is this?")
// ===========================================================================

#[tokio::test]
async fn question_routes_to_conversation_and_succeeds() {
    let dir = fixture();
    let provider = ScriptedProvider::new(&[
        QUESTION_INTENT,
        "This project is written in TypeScript.",
    ]);
    let kernel = kernel_with(&dir, provider.clone(), AssistantConfig::default()).await;

    let response = kernel.handle_message("What language is this project?").await;
    assert!(response.contains("TypeScript"));

    // intent analysis + one conversational call, no plan
    assert_eq!(provider.call_count(), 2);
    assert!(kernel.active_plan().await.is_none());

    let turn = kernel.recent_turns(1).await.remove(0);
    assert_eq!(turn.outcome, Outcome::Success);
    let intent = turn.intent.unwrap();
    assert_eq!(intent.intent_type, IntentType::Question);
    // no files were touched
    assert!(kernel.editor().applied_edits().await.is_empty());
}

#[tokio::test]
async fn repeated_simple_questions_hit_the_response_cache() {
    let dir = fixture();
    let provider = ScriptedProvider::new(&[
        QUESTION_INTENT,
        "TypeScript.",
        QUESTION_INTENT,
    ]);
    let kernel = kernel_with(&dir, provider.clone(), AssistantConfig::default()).await;

    let first = kernel.handle_message("What language is this project?").await;
    let second = kernel.handle_message("What language is this project?").await;
    assert_eq!(first, second);
    // second turn analyzed intent but skipped the conversational call
    assert_eq!(provider.call_count(), 3);
}

// ===========================================================================
// Kernel: plan proposal and approval (scenario: single-file safe edit)
// ===========================================================================

#[tokio::test]
async fn plan_is_proposed_then_executed_on_yes() {
    let dir = fixture();
    let provider = ScriptedProvider::new(&[
        EDIT_INTENT,
        EDIT_PLAN,
        "// Copyright Example Corp\nx=1\n",
    ]);
    let kernel = kernel_with(&dir, provider.clone(), AssistantConfig::default()).await;

    let proposal = kernel
        .handle_message("add a copyright header to src/a.js")
        .await;
    assert!(proposal.contains("Proposed plan"));
    assert!(proposal.contains("Add the header"));
    let (state, _) = kernel.active_plan().await.unwrap();
    assert_eq!(state, PlanState::Proposal);
    // nothing on disk changed yet
    assert_eq!(fs::read_to_string(dir.path().join("src/a.js")).unwrap(), "x=1\n");

    let summary = kernel.handle_message("yes").await;
    assert!(summary.contains("1/1 tasks completed"));

    // the file was edited through the safe editor
    let content = fs::read_to_string(dir.path().join("src/a.js")).unwrap();
    assert!(content.starts_with("// Copyright"));

    let applied = kernel.editor().applied_edits().await;
    assert_eq!(applied.len(), 1);
    let backup = applied[0].backup_path.as_ref().unwrap();
    assert_eq!(fs::read_to_string(backup).unwrap(), "x=1\n");

    let (state, progress) = kernel.active_plan().await.unwrap();
    assert_eq!(state, PlanState::Completed);
    assert_eq!(progress.completed, 1);

    let turn = kernel.recent_turns(1).await.remove(0);
    assert_eq!(turn.outcome, Outcome::Success);
    assert!(turn.actions.iter().any(|a| a.tool.as_deref() == Some("editor")));
}

#[tokio::test]
async fn plan_is_discarded_on_no() {
    let dir = fixture();
    let provider = ScriptedProvider::new(&[EDIT_INTENT, EDIT_PLAN]);
    let kernel = kernel_with(&dir, provider.clone(), AssistantConfig::default()).await;

    kernel
        .handle_message("add a copyright header to src/a.js")
        .await;
    let reply = kernel.handle_message("no").await;
    assert!(reply.contains("discarded"));
    assert!(kernel.active_plan().await.is_none());
    assert_eq!(fs::read_to_string(dir.path().join("src/a.js")).unwrap(), "x=1\n");
}

#[tokio::test]
async fn failed_task_reports_partial_outcome_and_retries() {
    let dir = fixture();
    // every task execution returns content that fails JS validation,
    // so the task and its adaptation retries all fail
    let provider = ScriptedProvider::new(&[
        EDIT_INTENT,
        EDIT_PLAN,
        "function broken( {",
    ]);
    let kernel = kernel_with(&dir, provider.clone(), AssistantConfig::default()).await;

    kernel
        .handle_message("add a copyright header to src/a.js")
        .await;
    let summary = kernel.handle_message("yes").await;

    assert!(summary.contains("failed"));
    assert!(summary.contains("re-run") || summary.contains("rephrase"));
    // the file is untouched
    assert_eq!(fs::read_to_string(dir.path().join("src/a.js")).unwrap(), "x=1\n");
    let (state, _) = kernel.active_plan().await.unwrap();
    assert_eq!(state, PlanState::Failed);

    let turn = kernel.recent_turns(1).await.remove(0);
    assert_eq!(turn.outcome, Outcome::Failure);
}

// ===========================================================================
// Kernel: commands and metrics
// ===========================================================================

#[tokio::test]
async fn tools_command_lists_registry() {
    let dir = fixture();
    let provider = ScriptedProvider::new(&["unused"]);
    let kernel = kernel_with(&dir, provider.clone(), AssistantConfig::default()).await;

    let listing = kernel.handle_message("tools").await;
    assert!(listing.contains("filesystem"));
    assert!(listing.contains("search"));
    // command routing never consults the model
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn health_command_reports_provider() {
    let dir = fixture();
    let provider = ScriptedProvider::new(&["unused"]);
    let kernel = kernel_with(&dir, provider.clone(), AssistantConfig::default()).await;
    let response = kernel.handle_message("health").await;
    assert!(response.contains("reachable"));
}

#[tokio::test]
async fn metrics_track_messages_and_latency() {
    let dir = fixture();
    let provider = ScriptedProvider::new(&[QUESTION_INTENT, "answer"]);
    let kernel = kernel_with(&dir, provider.clone(), AssistantConfig::default()).await;

    kernel.handle_message("what is this?").await;
    kernel.handle_message("tools").await;

    let metrics = kernel.metrics().await;
    assert_eq!(metrics.messages, 2);
    assert!(metrics.average_processing_ms >= 0.0);
    assert_eq!(kernel.turn_count().await, 2);
}

#[tokio::test]
async fn feedback_reaches_the_store() {
    let dir = fixture();
    let provider = ScriptedProvider::new(&["unused"]);
    let kernel = kernel_with(&dir, provider.clone(), AssistantConfig::default()).await;
    kernel.handle_message("tools").await;
    let turn = kernel.recent_turns(1).await.remove(0);
    kernel
        .record_feedback(
            turn.id,
            UserFeedback {
                rating: 5,
                helpful: true,
                accurate: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(
        kernel.recent_turns(1).await.remove(0).feedback.unwrap().rating,
        5
    );
}
