//! Tests for the task planner: drafting, validation, ordering, adaptation

use codeforge_core::*;
use codeforge_llm::{ChatRequest, ChatResponse, ChatMessage, LlmProvider, LlmResult, LlmStream, StreamDelta};
use codeforge_planner::planner::{execution_order, validate_plan};
use codeforge_planner::{PlanningContext, QualityRequirements, TaskPlanner};
use std::sync::Arc;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Scripted provider: pops canned responses in order, repeating the last.
struct ScriptedProvider {
    responses: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
        })
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
        let tokens = vec![
            Ok(StreamDelta::Token(response.message.content)),
            Ok(StreamDelta::Done {
                total_duration: None,
            }),
        ];
        Ok(Box::pin(futures::stream::iter(tokens)))
    }
    async fn test_connection(&self) -> bool {
        true
    }
}

fn task_intent(action: &str) -> Intent {
    let mut intent = Intent::conversational(action);
    intent.intent_type = IntentType::TaskRequest;
    intent.confidence = 0.8;
    intent
}

fn ctx() -> PlanningContext {
    let mut ctx = PlanningContext::new("/tmp/project");
    ctx.available_tools = vec!["filesystem".to_string(), "search".to_string()];
    ctx.project_languages = vec!["Rust".to_string()];
    ctx
}

const TWO_TASK_DRAFT: &str = r#"{
  "title": "Add header",
  "description": "Add a copyright header and verify",
  "tasks": [
    {
      "title": "Edit the file",
      "description": "Prepend the header",
      "type": "implementation",
      "priority": "high",
      "dependencies": [],
      "estimatedDuration": 20,
      "toolsRequired": ["filesystem"],
      "filesInvolved": ["src/a.js"],
      "acceptance_criteria": ["header present"]
    },
    {
      "title": "Verify",
      "description": "Check the file",
      "type": "testing",
      "priority": "medium",
      "dependencies": ["Edit the file"],
      "estimatedDuration": 15,
      "toolsRequired": ["search"],
      "filesInvolved": ["src/a.js"],
      "acceptance_criteria": []
    }
  ]
}"#;

// ===========================================================================
// Plan creation
// ===========================================================================

#[tokio::test]
async fn create_plan_builds_dag_from_draft() {
    let provider = ScriptedProvider::new(&[TWO_TASK_DRAFT]);
    let planner = TaskPlanner::new(provider);

    let plan = planner
        .create_plan(&task_intent("add header"), &ctx(), None)
        .await
        .unwrap();

    assert_eq!(plan.tasks.len(), 2);
    assert_eq!(plan.title, "Add header");
    let verify = plan.tasks.iter().find(|t| t.title == "Verify").unwrap();
    assert_eq!(verify.dependencies, vec!["task-1".to_string()]);
    assert_eq!(plan.estimated_duration, 35);
    assert_eq!(plan.progress.total, 2);
    assert_eq!(plan.progress.completed, 0);
}

#[tokio::test]
async fn unparseable_draft_falls_back_to_single_task() {
    let provider = ScriptedProvider::new(&["I cannot produce JSON, sorry."]);
    let planner = TaskPlanner::new(provider);

    let plan = planner
        .create_plan(&task_intent("fix the bug"), &ctx(), None)
        .await
        .unwrap();
    assert_eq!(plan.tasks.len(), 1);
    assert_eq!(plan.tasks[0].id, "task-1");
    assert!((plan.metadata.confidence - 0.3).abs() < f64::EPSILON);
}

#[tokio::test]
async fn dangling_dependencies_are_dropped() {
    let draft = r#"{
      "title": "p", "description": "",
      "tasks": [
        {"title": "A", "description": "", "type": "analysis",
         "dependencies": ["does not exist"], "estimatedDuration": 15}
      ]
    }"#;
    let provider = ScriptedProvider::new(&[draft]);
    let planner = TaskPlanner::new(provider);
    let plan = planner
        .create_plan(&task_intent("analyze"), &ctx(), None)
        .await
        .unwrap();
    assert!(plan.tasks[0].dependencies.is_empty());
}

#[tokio::test]
async fn cyclic_draft_is_rejected() {
    let draft = r#"{
      "title": "cycle", "description": "",
      "tasks": [
        {"title": "T1", "description": "", "type": "analysis", "dependencies": ["T2"]},
        {"title": "T2", "description": "", "type": "analysis", "dependencies": ["T1"]}
      ]
    }"#;
    let provider = ScriptedProvider::new(&[draft]);
    let planner = TaskPlanner::new(provider);
    let err = planner
        .create_plan(&task_intent("loop"), &ctx(), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Circular dependency detected"));
}

#[tokio::test]
async fn durations_are_clamped_to_band() {
    let draft = r#"{
      "title": "p", "description": "",
      "tasks": [
        {"title": "tiny", "description": "", "type": "analysis", "estimatedDuration": 2},
        {"title": "huge", "description": "", "type": "analysis", "estimatedDuration": 500}
      ]
    }"#;
    let provider = ScriptedProvider::new(&[draft]);
    let planner = TaskPlanner::new(provider);
    let plan = planner
        .create_plan(&task_intent("work"), &ctx(), None)
        .await
        .unwrap();
    assert_eq!(plan.tasks.iter().map(|t| t.estimated_duration).min(), Some(15));
    assert_eq!(plan.tasks.iter().map(|t| t.estimated_duration).max(), Some(60));
}

// ===========================================================================
// Validation and ordering on hand-built plans
// ===========================================================================

fn hand_plan() -> TaskPlan {
    let mut plan = TaskPlan::new("p", "d");
    let a = Task::new("a", "a", "", TaskType::Analysis);
    let mut b = Task::new("b", "b", "", TaskType::Implementation);
    b.dependencies = vec!["a".to_string()];
    let mut c = Task::new("c", "c", "", TaskType::Testing);
    c.dependencies = vec!["a".to_string()];
    c.priority = TaskPriority::High;
    plan.tasks = vec![a, b, c];
    plan
}

#[test]
fn validate_accepts_dag() {
    assert!(validate_plan(&hand_plan()).is_ok());
}

#[test]
fn validate_rejects_cycle() {
    let mut plan = hand_plan();
    plan.task_mut("a").unwrap().dependencies = vec!["b".to_string()];
    let err = validate_plan(&plan).unwrap_err();
    assert!(err.to_string().contains("Circular dependency detected"));
}

#[test]
fn validate_rejects_unknown_dependency() {
    let mut plan = hand_plan();
    plan.task_mut("b").unwrap().dependencies = vec!["ghost".to_string()];
    assert!(validate_plan(&plan).is_err());
}

#[test]
fn execution_order_respects_priority_after_deps() {
    let order = execution_order(&hand_plan()).unwrap();
    // a must come first; c outranks b
    assert_eq!(order, vec!["a".to_string(), "c".to_string(), "b".to_string()]);
}

#[test]
fn execution_order_is_deterministic() {
    let plan = hand_plan();
    let first = execution_order(&plan).unwrap();
    for _ in 0..5 {
        assert_eq!(execution_order(&plan).unwrap(), first);
    }
}

#[test]
fn execution_order_detects_deadlock() {
    let mut plan = TaskPlan::new("p", "d");
    let mut a = Task::new("a", "a", "", TaskType::Analysis);
    a.dependencies = vec!["b".to_string()];
    let mut b = Task::new("b", "b", "", TaskType::Analysis);
    b.dependencies = vec!["a".to_string()];
    plan.tasks = vec![a, b];
    let err = execution_order(&plan).unwrap_err();
    assert!(err.to_string().contains("deadlock"));
}

// ===========================================================================
// Complexity escalation
// ===========================================================================

#[test]
fn complexity_escalates_for_size_and_quality() {
    use codeforge_planner::planner::estimate_complexity;
    let intent = task_intent("refactor");
    let mut planning = ctx();
    assert_eq!(estimate_complexity(&intent, &planning), Complexity::Simple);

    planning.codebase_size = CodebaseSize::Large;
    assert_eq!(estimate_complexity(&intent, &planning), Complexity::Moderate);

    planning.quality_requirements = QualityRequirements::Enterprise;
    assert_eq!(estimate_complexity(&intent, &planning), Complexity::Complex);
}

// ===========================================================================
// Adaptation
// ===========================================================================

#[tokio::test]
async fn adapt_appends_retry_with_halved_estimate() {
    let provider = ScriptedProvider::new(&[TWO_TASK_DRAFT]);
    let planner = TaskPlanner::new(provider);
    let mut plan = planner
        .create_plan(&task_intent("add header"), &ctx(), None)
        .await
        .unwrap();

    plan.task_mut("task-1").unwrap().status = TaskStatus::Failed;
    let retry_id = planner.adapt(&mut plan, "task-1").unwrap();

    let retry = plan.task(&retry_id).unwrap();
    assert!(retry.title.starts_with("Retry:"));
    assert_eq!(retry.estimated_duration, 10); // 20 halved
    assert_eq!(plan.metadata.adaptations, 1);
    assert_eq!(plan.progress.total, 3);
}

#[tokio::test]
async fn adaptations_cap_at_three() {
    let provider = ScriptedProvider::new(&[TWO_TASK_DRAFT]);
    let planner = TaskPlanner::new(provider);
    let mut plan = planner
        .create_plan(&task_intent("add header"), &ctx(), None)
        .await
        .unwrap();

    for _ in 0..3 {
        assert!(planner.adapt(&mut plan, "task-1").is_some());
    }
    assert!(planner.adapt(&mut plan, "task-1").is_none());
    assert_eq!(plan.status, PlanStatus::Failed);
    assert_eq!(plan.metadata.adaptations, 3);
}

// ===========================================================================
// Per-task execution
// ===========================================================================

#[tokio::test]
async fn execute_task_passes_dependency_results() {
    let provider = ScriptedProvider::new(&["work product text"]);
    let planner = TaskPlanner::new(provider);
    let task = Task::new("task-1", "Verify", "check things", TaskType::Testing);
    let result = planner
        .execute_task(
            &task,
            &[("Edit the file".to_string(), "done".to_string())],
            None,
        )
        .await
        .unwrap();
    assert_eq!(result, "work product text");
}
