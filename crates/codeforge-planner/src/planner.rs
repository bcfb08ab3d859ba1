//! Task planner — LLM-drafted plans validated into executable DAGs
//!
//! The model drafts a plan against a fixed JSON schema; everything it says
//! is checked here: ids are assigned, dangling dependencies dropped with a
//! warning, cycles rejected outright. Execution order is a deterministic
//! topological traversal, and failed tasks may be retried through appended
//! adaptation tasks, three per plan at most.

use crate::prompts;
use codeforge_core::{
    CodebaseSize, Complexity, Error, Intent, Result, Task, TaskPlan, TaskPriority, TaskStatus,
    TaskType,
};
use codeforge_llm::{ChatMessage, ChatRequest, LlmProvider};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const MAX_ADAPTATIONS: u32 = 3;
const MIN_TASK_MINUTES: u32 = 15;
const MAX_TASK_MINUTES: u32 = 60;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UserExperience {
    Novice,
    #[default]
    Intermediate,
    Expert,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QualityRequirements {
    #[default]
    Basic,
    Production,
    Enterprise,
}

/// Everything the planner knows about the surrounding project.
#[derive(Clone, Debug)]
pub struct PlanningContext {
    pub project_root: PathBuf,
    pub available_tools: Vec<String>,
    pub project_languages: Vec<String>,
    pub codebase_size: CodebaseSize,
    pub user_experience: UserExperience,
    pub quality_requirements: QualityRequirements,
    /// Minutes, when the user set a deadline.
    pub time_constraints: Option<u32>,
}

impl PlanningContext {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            available_tools: Vec::new(),
            project_languages: Vec::new(),
            codebase_size: CodebaseSize::default(),
            user_experience: UserExperience::default(),
            quality_requirements: QualityRequirements::default(),
            time_constraints: None,
        }
    }
}

pub struct TaskPlanner {
    provider: Arc<dyn LlmProvider>,
}

impl TaskPlanner {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Build a validated plan for an intent. A model that cannot produce
    /// parseable JSON degrades to a single-task fallback plan rather than an
    /// error; a cyclic draft is rejected.
    pub async fn create_plan(
        &self,
        intent: &Intent,
        ctx: &PlanningContext,
        cancel: Option<CancellationToken>,
    ) -> Result<TaskPlan> {
        let complexity = estimate_complexity(intent, ctx);

        let prompt = prompts::PLAN_PROMPT
            .replace("{complexity}", &format!("{:?}", complexity).to_lowercase())
            .replace("{tools}", &ctx.available_tools.join(", "))
            .replace("{languages}", &ctx.project_languages.join(", "))
            .replace("{action}", &intent.action)
            .replace("{input}", &plan_request_text(intent));

        let request = ChatRequest::new(self.provider.model())
            .with_message(ChatMessage::user(prompt))
            .json_format();

        let draft = match self.provider.complete(request, cancel).await {
            Ok(response) => parse_draft(response.content()),
            Err(e) => {
                debug!("plan request failed, falling back: {}", e);
                None
            }
        };

        let mut plan = match draft {
            Some(draft) if !draft.tasks.is_empty() => {
                build_plan(draft, intent, complexity)?
            }
            _ => fallback_plan(intent, complexity),
        };

        optimize(&mut plan);
        validate_plan(&plan)?;
        plan.refresh_progress();
        Ok(plan)
    }

    /// Run one task through the model: description, dependency results, and
    /// acceptance criteria in, work product text out.
    pub async fn execute_task(
        &self,
        task: &Task,
        dependency_results: &[(String, String)],
        cancel: Option<CancellationToken>,
    ) -> Result<String> {
        let results_text = if dependency_results.is_empty() {
            "(none)".to_string()
        } else {
            dependency_results
                .iter()
                .map(|(title, result)| format!("- {}: {}", title, result))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let criteria_text = if task.acceptance_criteria.is_empty() {
            "(none)".to_string()
        } else {
            task.acceptance_criteria
                .iter()
                .map(|c| format!("- {}", c))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let prompt = prompts::TASK_PROMPT
            .replace("{title}", &task.title)
            .replace("{description}", &task.description)
            .replace("{dependency_results}", &results_text)
            .replace("{acceptance_criteria}", &criteria_text)
            .replace("{tools}", &task.tools_required.join(", "));

        let request = ChatRequest::new(self.provider.model())
            .with_message(ChatMessage::user(prompt));
        let response = self.provider.complete(request, cancel).await?;
        Ok(response.content().to_string())
    }

    /// Adaptive re-planning: append a retry task for a failed one, estimate
    /// halved, up to three adaptations per plan. Past the cap the plan is
    /// marked failed and `None` is returned.
    pub fn adapt(&self, plan: &mut TaskPlan, failed_task_id: &str) -> Option<String> {
        if plan.metadata.adaptations >= MAX_ADAPTATIONS {
            plan.status = codeforge_core::PlanStatus::Failed;
            warn!("plan {} exhausted its adaptations", plan.id);
            return None;
        }
        let failed = plan.task(failed_task_id)?.clone();

        let retry_id = format!("task-{}", plan.tasks.len() + 1);
        let mut retry = Task::new(
            retry_id.clone(),
            format!("Retry: {}", failed.title),
            failed.description.clone(),
            failed.task_type,
        );
        retry.priority = failed.priority;
        retry.dependencies = failed.dependencies.clone();
        retry.estimated_duration = (failed.estimated_duration / 2).max(1);
        retry.tools_required = failed.tools_required.clone();
        retry.files_involved = failed.files_involved.clone();
        retry.acceptance_criteria = failed.acceptance_criteria.clone();

        plan.dependencies
            .insert(retry_id.clone(), retry.dependencies.clone());
        plan.estimated_duration += retry.estimated_duration;
        plan.tasks.push(retry);
        plan.metadata.adaptations += 1;
        plan.refresh_progress();
        debug!(
            "plan {}: appended {} for failed {}",
            plan.id, retry_id, failed_task_id
        );
        Some(retry_id)
    }
}

/// Intent complexity escalated once for a large codebase and once for
/// enterprise quality requirements.
pub fn estimate_complexity(intent: &Intent, ctx: &PlanningContext) -> Complexity {
    let mut complexity = intent.complexity;
    if ctx.codebase_size == CodebaseSize::Large {
        complexity = complexity.escalate();
    }
    if ctx.quality_requirements == QualityRequirements::Enterprise {
        complexity = complexity.escalate();
    }
    complexity
}

fn plan_request_text(intent: &Intent) -> String {
    let mut text = intent.action.clone();
    if !intent.entities.files.is_empty() {
        text.push_str(&format!(" — files: {}", intent.entities.files.join(", ")));
    }
    if !intent.entities.concepts.is_empty() {
        text.push_str(&format!(" — concepts: {}", intent.entities.concepts.join(", ")));
    }
    text
}

// ---------------------------------------------------------------------------
// Draft parsing and validation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PlanDraft {
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tasks: Vec<TaskDraft>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskDraft {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    task_type: Option<TaskType>,
    priority: Option<TaskPriority>,
    #[serde(default)]
    dependencies: Vec<String>,
    estimated_duration: Option<u32>,
    #[serde(default)]
    tools_required: Vec<String>,
    #[serde(default)]
    files_involved: Vec<String>,
    #[serde(default, rename = "acceptance_criteria")]
    acceptance_criteria: Vec<String>,
}

fn parse_draft(text: &str) -> Option<PlanDraft> {
    let json = prompts::extract_json_object(text)?;
    serde_json::from_str(json).ok()
}

/// Turn a draft into a plan: sequential ids, dependency references resolved
/// by title or 1-based index, dangling references dropped with a warning.
fn build_plan(draft: PlanDraft, intent: &Intent, complexity: Complexity) -> Result<TaskPlan> {
    let mut plan = TaskPlan::new(
        draft.title.unwrap_or_else(|| intent.action.clone()),
        draft.description.unwrap_or_default(),
    );
    plan.metadata.complexity = complexity;
    plan.metadata.confidence = intent.confidence;

    let titles: Vec<String> = draft.tasks.iter().map(|t| t.title.to_lowercase()).collect();

    for (index, task_draft) in draft.tasks.iter().enumerate() {
        let id = format!("task-{}", index + 1);
        let mut task = Task::new(
            id,
            task_draft.title.clone(),
            task_draft.description.clone(),
            task_draft.task_type.unwrap_or(TaskType::Implementation),
        );
        task.priority = task_draft.priority.unwrap_or(TaskPriority::Medium);
        task.estimated_duration = task_draft
            .estimated_duration
            .unwrap_or(MIN_TASK_MINUTES)
            .clamp(MIN_TASK_MINUTES, MAX_TASK_MINUTES);
        task.tools_required = task_draft.tools_required.clone();
        task.files_involved = task_draft.files_involved.clone();
        task.acceptance_criteria = task_draft.acceptance_criteria.clone();

        for dep in &task_draft.dependencies {
            match resolve_dependency(dep, &titles, index) {
                Some(dep_index) => task.dependencies.push(format!("task-{}", dep_index + 1)),
                None => warn!(
                    "dropping dangling dependency '{}' of task '{}'",
                    dep, task_draft.title
                ),
            }
        }
        task.dependencies.dedup();

        plan.dependencies
            .insert(task.id.clone(), task.dependencies.clone());
        plan.estimated_duration += task.estimated_duration;
        plan.tasks.push(task);
    }

    Ok(plan)
}

/// A dependency names an earlier task by title, by "task-N" id, or by
/// 1-based index.
fn resolve_dependency(reference: &str, titles: &[String], own_index: usize) -> Option<usize> {
    let lower = reference.to_lowercase();
    if let Some(found) = titles.iter().position(|t| *t == lower) {
        if found != own_index {
            return Some(found);
        }
        return None;
    }
    let numeric = lower
        .strip_prefix("task-")
        .unwrap_or(&lower)
        .parse::<usize>()
        .ok()?;
    if numeric >= 1 && numeric <= titles.len() && numeric - 1 != own_index {
        Some(numeric - 1)
    } else {
        None
    }
}

/// Single-task plan used when the model's draft is unusable.
fn fallback_plan(intent: &Intent, complexity: Complexity) -> TaskPlan {
    let mut plan = TaskPlan::new(
        intent.action.clone(),
        "Single-task plan generated without model assistance".to_string(),
    );
    plan.metadata.complexity = complexity;
    plan.metadata.confidence = 0.3;

    let mut task = Task::new(
        "task-1",
        intent.action.clone(),
        format!("Carry out the request: {}", intent.action),
        TaskType::Implementation,
    );
    task.estimated_duration = intent.estimated_duration.clamp(MIN_TASK_MINUTES, MAX_TASK_MINUTES);
    task.files_involved = intent.entities.files.clone();
    plan.dependencies.insert(task.id.clone(), Vec::new());
    plan.estimated_duration = task.estimated_duration;
    plan.tasks.push(task);
    plan
}

/// Plan invariants: every dependency id exists and the graph is acyclic
/// (DFS with a recursion stack).
pub fn validate_plan(plan: &TaskPlan) -> Result<()> {
    let ids: HashSet<&str> = plan.tasks.iter().map(|t| t.id.as_str()).collect();
    for task in &plan.tasks {
        for dep in &task.dependencies {
            if !ids.contains(dep.as_str()) {
                return Err(Error::plan(format!(
                    "task '{}' depends on unknown task '{}'",
                    task.id, dep
                )));
            }
        }
    }

    let index: HashMap<&str, &Task> =
        plan.tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        id: &'a str,
        index: &HashMap<&'a str, &'a Task>,
        visited: &mut HashSet<&'a str>,
        stack: &mut HashSet<&'a str>,
    ) -> Result<()> {
        if stack.contains(id) {
            return Err(Error::plan("Circular dependency detected".to_string()));
        }
        if visited.contains(id) {
            return Ok(());
        }
        stack.insert(id);
        if let Some(task) = index.get(id) {
            for dep in &task.dependencies {
                visit(dep.as_str(), index, visited, stack)?;
            }
        }
        stack.remove(id);
        visited.insert(id);
        Ok(())
    }

    for task in &plan.tasks {
        visit(task.id.as_str(), &index, &mut visited, &mut stack)?;
    }
    Ok(())
}

/// Deterministic execution order: among tasks whose dependencies are all
/// scheduled, pick the highest priority, tie-break on earliest `created`,
/// then insertion order. Unfinished tasks with no runnable candidate mean a
/// deadlocked graph.
pub fn execution_order(plan: &TaskPlan) -> Result<Vec<String>> {
    let mut scheduled: HashSet<&str> = HashSet::new();
    let mut order: Vec<String> = Vec::new();

    while order.len() < plan.tasks.len() {
        let candidate = plan
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| {
                !scheduled.contains(t.id.as_str())
                    && t.dependencies.iter().all(|d| scheduled.contains(d.as_str()))
            })
            .max_by(|(ai, a), (bi, b)| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.created.cmp(&a.created))
                    .then_with(|| bi.cmp(ai))
            });
        match candidate {
            Some((_, task)) => {
                scheduled.insert(task.id.as_str());
                order.push(task.id.clone());
            }
            None => {
                return Err(Error::plan(
                    "deadlock: unfinished tasks with no runnable candidate".to_string(),
                ))
            }
        }
    }
    Ok(order)
}

/// Reorder the task list topologically with priority as the secondary key,
/// preferring to keep tasks that share files adjacent.
fn optimize(plan: &mut TaskPlan) {
    let Ok(mut order) = execution_order(plan) else {
        return;
    };

    // group by shared files where dependencies allow the swap
    let files_of: HashMap<String, HashSet<String>> = plan
        .tasks
        .iter()
        .map(|t| {
            (
                t.id.clone(),
                t.files_involved.iter().cloned().collect::<HashSet<_>>(),
            )
        })
        .collect();
    let deps_of: HashMap<String, HashSet<String>> = plan
        .tasks
        .iter()
        .map(|t| (t.id.clone(), t.dependencies.iter().cloned().collect()))
        .collect();

    let mut i = 1;
    while i + 1 < order.len() {
        let prev = order[i - 1].clone();
        let current = order[i].clone();
        let next = order[i + 1].clone();
        let shares_next = !files_of[&prev].is_disjoint(&files_of[&next]);
        let shares_current = !files_of[&prev].is_disjoint(&files_of[&current]);
        // pull a file-sharing task forward when the one in between doesn't
        // depend on anything being swapped past it
        if shares_next && !shares_current && !deps_of[&next].contains(&current) {
            order.swap(i, i + 1);
        }
        i += 1;
    }

    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    plan.tasks
        .sort_by_key(|t| position.get(t.id.as_str()).copied().unwrap_or(usize::MAX));
}

/// Ids of tasks whose dependencies are complete and which are still pending,
/// in scheduling order. What the kernel polls while driving a plan.
pub fn runnable_tasks(plan: &TaskPlan) -> Vec<String> {
    plan.tasks
        .iter()
        .filter(|t| {
            t.status == TaskStatus::Pending
                && t.dependencies.iter().all(|d| {
                    plan.task(d)
                        .map(|dep| dep.status == TaskStatus::Completed)
                        .unwrap_or(false)
                })
        })
        .map(|t| t.id.clone())
        .collect()
}
