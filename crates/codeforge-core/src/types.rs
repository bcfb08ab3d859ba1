//! Core data model: intents, tasks, plans, and conversation turns.
//!
//! Plans own their tasks directly and tasks reference each other by id, so
//! the dependency graph carries no back-pointers. All records round-trip
//! through serde_json unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Classification of a user utterance.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    TaskRequest,
    Question,
    Command,
    Conversation,
    Clarification,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    Expert,
}

impl Complexity {
    pub fn escalate(self) -> Self {
        match self {
            Self::Simple => Self::Moderate,
            Self::Moderate => Self::Complex,
            Self::Complex | Self::Expert => Self::Expert,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }
}

/// Entities extracted from an utterance, grouped by kind.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EntitySet {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub variables: Vec<String>,
}

impl EntitySet {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
            && self.directories.is_empty()
            && self.functions.is_empty()
            && self.classes.is_empty()
            && self.technologies.is_empty()
            && self.concepts.is_empty()
            && self.variables.is_empty()
    }

    /// Files plus directories — the count the risk scorer escalates on.
    pub fn file_count(&self) -> usize {
        self.files.len() + self.directories.len()
    }

    /// Union with another set, deduplicating.
    pub fn merge(&mut self, other: &EntitySet) {
        fn extend(dst: &mut Vec<String>, src: &[String]) {
            for item in src {
                if !dst.contains(item) {
                    dst.push(item.clone());
                }
            }
        }
        extend(&mut self.files, &other.files);
        extend(&mut self.directories, &other.directories);
        extend(&mut self.functions, &other.functions);
        extend(&mut self.classes, &other.classes);
        extend(&mut self.technologies, &other.technologies);
        extend(&mut self.concepts, &other.concepts);
        extend(&mut self.variables, &other.variables);
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntentContext {
    #[serde(default)]
    pub project_aware: bool,
    #[serde(default)]
    pub file_specific: bool,
    #[serde(default)]
    pub follow_up: bool,
    #[serde(default)]
    pub references: Vec<String>,
}

/// Normalized, structured interpretation of a user utterance.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    #[serde(rename = "type")]
    pub intent_type: IntentType,
    /// Normalized verb phrase, e.g. "create", "explain".
    pub action: String,
    #[serde(default)]
    pub entities: EntitySet,
    /// Confidence in this interpretation, 0.0..=1.0.
    pub confidence: f64,
    pub complexity: Complexity,
    pub multi_step: bool,
    pub risk_level: RiskLevel,
    pub requires_clarification: bool,
    #[serde(default)]
    pub suggested_questions: Vec<String>,
    /// Estimated duration in minutes.
    pub estimated_duration: u32,
    #[serde(default)]
    pub context: IntentContext,
}

impl Intent {
    /// A low-stakes conversational intent, used as the fallback baseline.
    pub fn conversational(action: impl Into<String>) -> Self {
        Self {
            intent_type: IntentType::Conversation,
            action: action.into(),
            entities: EntitySet::default(),
            confidence: 0.5,
            complexity: Complexity::Simple,
            multi_step: false,
            risk_level: RiskLevel::Low,
            requires_clarification: false,
            suggested_questions: Vec::new(),
            estimated_duration: 1,
            context: IntentContext::default(),
        }
    }

    pub fn is_simple_question(&self) -> bool {
        self.intent_type == IntentType::Question && self.complexity == Complexity::Simple
    }
}

// ---------------------------------------------------------------------------
// Conversation turns
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Partial,
    Pending,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserFeedback {
    /// 1..=5
    pub rating: u8,
    pub helpful: bool,
    pub accurate: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionTaken {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub success: bool,
}

/// Where the conversation stood when a turn was recorded.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub working_directory: PathBuf,
    #[serde(default)]
    pub active_files: Vec<String>,
    #[serde(default)]
    pub recently_modified: Vec<String>,
}

/// One user-message/assistant-response exchange.
///
/// Turns within a conversation are append-only, with ids assigned
/// monotonically by the conversation store.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub actions: Vec<ActionTaken>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<UserFeedback>,
    #[serde(default)]
    pub snapshot: ContextSnapshot,
}

impl Turn {
    pub fn new(id: u64, input: impl Into<String>, snapshot: ContextSnapshot) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            input: input.into(),
            intent: None,
            response: String::new(),
            actions: Vec::new(),
            outcome: Outcome::Pending,
            feedback: None,
            snapshot,
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks and plans
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Analysis,
    Implementation,
    Testing,
    Documentation,
    Refactoring,
}

/// Ordered so that `Low < Medium < High < Critical`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Blocked | Self::Cancelled
        )
    }
}

/// Smallest schedulable unit of work.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Minutes.
    pub estimated_duration: u32,
    #[serde(default)]
    pub tools_required: Vec<String>,
    #[serde(default)]
    pub files_involved: Vec<String>,
    #[serde(default, rename = "acceptance_criteria")]
    pub acceptance_criteria: Vec<String>,
    pub created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        task_type: TaskType,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            task_type,
            priority: TaskPriority::Medium,
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
            estimated_duration: 15,
            tools_required: Vec::new(),
            files_involved: Vec::new(),
            acceptance_criteria: Vec::new(),
            created: Utc::now(),
            started: None,
            completed: None,
            result: None,
            error: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Planning,
    Executing,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanProgress {
    pub completed: usize,
    pub total: usize,
    pub percentage: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlanMetadata {
    pub complexity: Complexity,
    pub confidence: f64,
    pub adaptations: u32,
}

impl Default for PlanMetadata {
    fn default() -> Self {
        Self {
            complexity: Complexity::Moderate,
            confidence: 0.5,
            adaptations: 0,
        }
    }
}

/// A DAG of tasks with lifecycle state and progress.
///
/// The plan owns its tasks; `dependencies` maps a task id to the ids it
/// depends on. The planner guarantees the graph is acyclic and that every
/// referenced id exists before a plan is accepted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPlan {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub dependencies: HashMap<String, Vec<String>>,
    /// Minutes, summed over tasks.
    pub estimated_duration: u32,
    pub status: PlanStatus,
    pub progress: PlanProgress,
    pub metadata: PlanMetadata,
}

impl TaskPlan {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            tasks: Vec::new(),
            dependencies: HashMap::new(),
            estimated_duration: 0,
            status: PlanStatus::Planning,
            progress: PlanProgress::default(),
            metadata: PlanMetadata::default(),
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Recompute progress from task statuses. `progress.completed` always
    /// equals the count of tasks in `Completed` and never decreases over a
    /// plan's lifetime because completed tasks stay completed.
    pub fn refresh_progress(&mut self) {
        let total = self.tasks.len();
        let completed = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        self.progress = PlanProgress {
            completed,
            total,
            percentage: if total == 0 {
                0.0
            } else {
                completed as f64 * 100.0 / total as f64
            },
        };
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    /// Ids of tasks that directly or transitively depend on `id`.
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut frontier = vec![id.to_string()];
        while let Some(current) = frontier.pop() {
            for task in &self.tasks {
                if task.dependencies.contains(&current) && !out.contains(&task.id) {
                    out.push(task.id.clone());
                    frontier.push(task.id.clone());
                }
            }
        }
        out
    }
}

/// Bucketed repository size, used to escalate planning complexity.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CodebaseSize {
    Small,
    #[default]
    Medium,
    Large,
}
