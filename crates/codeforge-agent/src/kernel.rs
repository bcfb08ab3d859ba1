//! Agent kernel — receive message → route → plan → execute → respond
//!
//! One kernel owns one session. Per message it appends a pending turn,
//! analyzes intent, routes to a command, a conversation, or a task plan,
//! and finishes the turn with the outcome. Plans above the auto-execute
//! bar are parked as proposals until the user approves them.

use codeforge_context::ProjectContext;
use codeforge_core::{
    ActionTaken, AssistantConfig, ContextSnapshot, Error, Intent, Outcome, PlanStatus, Result,
    RiskTolerance, TaskPlan, TaskPriority, TaskStatus, TaskType,
};
use codeforge_editor::SafeCodeEditor;
use codeforge_llm::{
    ChatMessage, ChatRequest, LlmError, LlmProvider, OllamaProvider, StreamDelta,
};
use futures::StreamExt;
use codeforge_planner::planner::runnable_tasks;
use codeforge_planner::{
    AnalysisContext, IntentAnalyzer, NlRouter, PlanningContext, QualityRequirements, Route,
    TaskPlanner,
};
use codeforge_tools::{
    create_default_registry, ExecutionContext, OrchestratorConfig, ToolOrchestrator, ToolRegistry,
};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const BUILTIN_COMMANDS: &[&str] = &["help", "tools", "health"];
const APPROVALS: &[&str] = &["yes", "y", "execute", "go ahead", "proceed", "approve"];
const REJECTIONS: &[&str] = &["no", "n", "cancel", "reject", "discard"];
const CONTEXT_SLICE_TOKENS: usize = 1500;

/// Lifecycle of the session's active plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanState {
    Proposal,
    Approved,
    Executing,
    Completed,
    Failed,
    Cancelled,
    Rejected,
}

struct ActivePlan {
    plan: TaskPlan,
    state: PlanState,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SessionMetrics {
    pub messages: u64,
    pub average_processing_ms: f64,
}

pub struct AgentKernel {
    config: AssistantConfig,
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    orchestrator: ToolOrchestrator,
    editor: Arc<SafeCodeEditor>,
    project: Arc<ProjectContext>,
    store: super::ConversationStore,
    analyzer: IntentAnalyzer,
    planner: TaskPlanner,
    router: NlRouter,
    session_id: String,
    active_plan: Mutex<Option<ActivePlan>>,
    metrics: Mutex<SessionMetrics>,
    response_cache: DashMap<String, String>,
    cancel: Mutex<CancellationToken>,
    /// Optional live token sink for conversational responses.
    stream_tx: Mutex<Option<tokio::sync::mpsc::Sender<String>>>,
}

impl AgentKernel {
    /// Wire the kernel against a local Ollama endpoint from the config.
    pub async fn new(config: AssistantConfig, root: impl AsRef<Path>) -> Result<Self> {
        let provider = Arc::new(
            OllamaProvider::new(&config.model).with_base_url(&config.base_url),
        );
        Self::with_provider(config, root, provider).await
    }

    /// Wire the kernel with an explicit provider (tests, other backends).
    pub async fn with_provider(
        config: AssistantConfig,
        root: impl AsRef<Path>,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        let project = ProjectContext::new(root.as_ref())?;
        if config.enable_context_awareness {
            let indexed = project.scan().await?;
            info!("indexed {} files under {}", indexed, project.root().display());
        }

        let registry = Arc::new(create_default_registry()?);
        let orchestrator = ToolOrchestrator::new(
            registry.clone(),
            OrchestratorConfig {
                max_concurrent_tools: config.execution_preferences.parallelism.max(1),
                enable_cache: true,
                ..Default::default()
            },
        );

        let state_dir = project.root().join(".codeforge");
        let editor = Arc::new(
            SafeCodeEditor::new(project.root(), state_dir.join("backups"))?
                .with_project(project.clone()),
        );

        let mut store = super::ConversationStore::new(config.max_conversation_history);
        if config.auto_save_conversations {
            store = store.with_persistence(state_dir.join("conversations"), true);
        }

        let mut commands: Vec<String> =
            BUILTIN_COMMANDS.iter().map(|c| c.to_string()).collect();
        commands.extend(registry.names());
        let router = NlRouter::new(commands);

        let analyzer = IntentAnalyzer::new(provider.clone());
        let planner = TaskPlanner::new(provider.clone());

        Ok(Self {
            config,
            provider,
            registry,
            orchestrator,
            editor,
            project,
            store,
            analyzer,
            planner,
            router,
            session_id: uuid::Uuid::new_v4().to_string(),
            active_plan: Mutex::new(None),
            metrics: Mutex::new(SessionMetrics::default()),
            response_cache: DashMap::new(),
            cancel: Mutex::new(CancellationToken::new()),
            stream_tx: Mutex::new(None),
        })
    }

    /// Attach (or detach) a channel that receives conversational tokens as
    /// they stream in. Delivery awaits the receiver, so a slow consumer
    /// pauses the stream between chunks.
    pub async fn set_stream_sink(&self, tx: Option<tokio::sync::mpsc::Sender<String>>) {
        *self.stream_tx.lock().await = tx;
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn editor(&self) -> &Arc<SafeCodeEditor> {
        &self.editor
    }

    pub fn project(&self) -> &Arc<ProjectContext> {
        &self.project
    }

    pub async fn metrics(&self) -> SessionMetrics {
        *self.metrics.lock().await
    }

    /// State and progress of the session's active plan, if any.
    pub async fn active_plan(&self) -> Option<(PlanState, codeforge_core::PlanProgress)> {
        self.active_plan
            .lock()
            .await
            .as_ref()
            .map(|a| (a.state, a.plan.progress.clone()))
    }

    pub async fn turn_count(&self) -> usize {
        self.store.turn_count(&self.session_id).await
    }

    pub async fn recent_turns(&self, n: usize) -> Vec<codeforge_core::Turn> {
        self.store.recent(&self.session_id, n).await
    }

    pub async fn record_feedback(
        &self,
        turn_id: u64,
        feedback: codeforge_core::UserFeedback,
    ) -> Result<()> {
        self.store
            .record_feedback(&self.session_id, turn_id, feedback)
            .await
    }

    /// Cancel whatever the kernel is doing. Pending edits are discarded,
    /// untouched backups stay put.
    pub async fn cancel(&self) {
        self.cancel.lock().await.cancel();
        let dropped = self.editor.cancel_all_pending().await;
        if dropped > 0 {
            debug!("cancelled {} pending edits", dropped);
        }
    }

    /// Handle one user message and return the assistant's response. Errors
    /// become a user-facing apology; the turn records the real outcome.
    pub async fn handle_message(&self, input: &str) -> String {
        let started = Instant::now();
        let snapshot = self.snapshot().await;
        let turn_id = self
            .store
            .append_turn(&self.session_id, input, snapshot)
            .await;

        // fresh token per message
        {
            let mut cancel = self.cancel.lock().await;
            *cancel = CancellationToken::new();
        }

        let (response, outcome, actions) = match self.process(input, turn_id).await {
            Ok(done) => done,
            Err(Error::Cancelled) => ("Cancelled.".to_string(), Outcome::Failure, Vec::new()),
            Err(e) => {
                warn!("turn {} failed: {}", turn_id, e);
                (
                    format!(
                        "I'm sorry — something went wrong while handling that: {}",
                        e
                    ),
                    Outcome::Failure,
                    Vec::new(),
                )
            }
        };

        let response_for_turn = response.clone();
        let _ = self
            .store
            .update_turn(&self.session_id, turn_id, move |turn| {
                turn.response = response_for_turn;
                turn.outcome = outcome;
                turn.actions = actions;
            })
            .await;

        let elapsed = started.elapsed().as_millis() as f64;
        let mut metrics = self.metrics.lock().await;
        metrics.messages += 1;
        metrics.average_processing_ms +=
            (elapsed - metrics.average_processing_ms) / metrics.messages as f64;

        response
    }

    async fn process(
        &self,
        input: &str,
        turn_id: u64,
    ) -> Result<(String, Outcome, Vec<ActionTaken>)> {
        if let Some(result) = self.handle_plan_reply(input).await? {
            return Ok(result);
        }

        let cancel = self.cancel.lock().await.clone();
        let analysis_ctx = self.analysis_context(input).await;
        let intent = self.analyzer.analyze(input, &analysis_ctx, Some(cancel.clone())).await;
        debug!(
            "turn {}: intent type={:?} action={} risk={:?}",
            turn_id, intent.intent_type, intent.action, intent.risk_level
        );
        {
            let intent_for_turn = intent.clone();
            let _ = self
                .store
                .update_turn(&self.session_id, turn_id, move |turn| {
                    turn.intent = Some(intent_for_turn);
                })
                .await;
        }

        let route = if self.config.enable_task_planning {
            self.router.route(input, &intent)
        } else {
            match self.router.route(input, &intent) {
                Route::TaskPlan => Route::Conversation,
                other => other,
            }
        };

        match route {
            Route::Command { name, args } => self.run_command(&name, &args, &cancel).await,
            Route::Conversation => {
                let response = self.converse(input, &intent, &analysis_ctx, &cancel).await?;
                Ok((response, Outcome::Success, Vec::new()))
            }
            Route::TaskPlan => self.plan(input, &intent, &cancel).await,
        }
    }

    // -----------------------------------------------------------------------
    // Conversation
    // -----------------------------------------------------------------------

    async fn converse(
        &self,
        input: &str,
        intent: &Intent,
        analysis_ctx: &AnalysisContext,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let cache_key = format!("{:?}:{}", intent.intent_type, intent.action);
        if intent.is_simple_question() && !intent.context.file_specific {
            if let Some(cached) = self.response_cache.get(&cache_key) {
                debug!("response cache hit for {}", cache_key);
                return Ok(cached.value().clone());
            }
        }

        let mut system = format!(
            "You are codeforge, a coding assistant working in the repository at {}.",
            self.project.root().display()
        );
        if let Some(summary) = &analysis_ctx.project_summary {
            system.push_str("\n\nProject context:\n");
            system.push_str(summary);
        }

        let mut request = ChatRequest::new(self.provider.model()).with_system(system);
        request.options.temperature = Some(self.config.temperature);
        if self.config.enable_conversation_history {
            for turn in self.store.recent(&self.session_id, 6).await {
                if turn.response.is_empty() {
                    continue;
                }
                request = request
                    .with_message(ChatMessage::user(turn.input.clone()))
                    .with_message(ChatMessage::assistant(turn.response.clone()));
            }
        }
        request = request.with_message(ChatMessage::user(input));

        let mut stream = self
            .provider
            .complete_stream(request, Some(cancel.clone()))
            .await?;
        let sink = self.stream_tx.lock().await.clone();
        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            match delta {
                Ok(StreamDelta::Token(token)) => {
                    if let Some(tx) = &sink {
                        let _ = tx.send(token.clone()).await;
                    }
                    text.push_str(&token);
                }
                Ok(StreamDelta::Done { .. }) => break,
                Err(LlmError::Cancelled) => return Err(Error::Cancelled),
                Err(e) => return Err(e.into()),
            }
        }

        if intent.is_simple_question() && !intent.context.file_specific {
            self.response_cache.insert(cache_key, text.clone());
        }
        Ok(text)
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    async fn run_command(
        &self,
        name: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<(String, Outcome, Vec<ActionTaken>)> {
        match name {
            "help" => {
                let mut lines = vec!["Available commands:".to_string()];
                lines.extend(BUILTIN_COMMANDS.iter().map(|c| format!("  {}", c)));
                lines.push("Registered tools:".to_string());
                for meta in self.registry.list() {
                    lines.push(format!("  {} — {}", meta.name, meta.description));
                }
                return Ok((lines.join("\n"), Outcome::Success, Vec::new()));
            }
            "tools" => {
                let listing = self
                    .registry
                    .list()
                    .into_iter()
                    .map(|m| format!("{} ({} v{}): {}", m.name, m.category, m.version, m.description))
                    .collect::<Vec<_>>()
                    .join("\n");
                return Ok((listing, Outcome::Success, Vec::new()));
            }
            "health" => {
                let healthy = self.provider.test_connection().await;
                let text = if healthy {
                    format!("{} is reachable.", self.provider.name())
                } else {
                    format!("{} is not responding.", self.provider.name())
                };
                let outcome = if healthy { Outcome::Success } else { Outcome::Failure };
                return Ok((text, outcome, Vec::new()));
            }
            _ => {}
        }

        let params = command_params(name, args);
        let ctx = self.execution_context(cancel);
        let result = self.orchestrator.execute_tool(name, params, &ctx).await;
        let action = ActionTaken {
            description: format!("ran {} {}", name, args.join(" ")),
            tool: Some(name.to_string()),
            success: result.success,
        };

        if result.success {
            let body = result
                .data
                .map(|d| serde_json::to_string_pretty(&d).unwrap_or_default())
                .unwrap_or_else(|| "(no output)".to_string());
            Ok((body, Outcome::Success, vec![action]))
        } else {
            let message = result.error.unwrap_or_else(|| "tool failed".to_string());
            Ok((
                format!("{} failed: {}", name, message),
                Outcome::Failure,
                vec![action],
            ))
        }
    }

    // -----------------------------------------------------------------------
    // Planning
    // -----------------------------------------------------------------------

    async fn plan(
        &self,
        _input: &str,
        intent: &Intent,
        cancel: &CancellationToken,
    ) -> Result<(String, Outcome, Vec<ActionTaken>)> {
        let planning_ctx = PlanningContext {
            project_root: self.project.root().to_path_buf(),
            available_tools: self.registry.names(),
            project_languages: self.project.languages().await,
            codebase_size: self.project.codebase_size().await,
            user_experience: Default::default(),
            quality_requirements: QualityRequirements::Production,
            time_constraints: None,
        };

        let plan = self
            .planner
            .create_plan(intent, &planning_ctx, Some(cancel.clone()))
            .await?;

        if self.should_auto_execute(&plan, intent) {
            let mut plan = plan;
            let (summary, outcome, actions) = self.execute_plan(&mut plan, cancel).await?;
            let state = match plan.status {
                PlanStatus::Completed => PlanState::Completed,
                _ => PlanState::Failed,
            };
            *self.active_plan.lock().await = Some(ActivePlan { plan, state });
            return Ok((summary, outcome, actions));
        }

        let proposal = render_proposal(&plan);
        *self.active_plan.lock().await = Some(ActivePlan {
            plan,
            state: PlanState::Proposal,
        });
        Ok((proposal, Outcome::Pending, Vec::new()))
    }

    /// Approve/reject replies while a proposal is parked.
    async fn handle_plan_reply(
        &self,
        input: &str,
    ) -> Result<Option<(String, Outcome, Vec<ActionTaken>)>> {
        let normalized = input.trim().to_lowercase();
        let mut guard = self.active_plan.lock().await;
        let Some(active) = guard.as_mut() else {
            return Ok(None);
        };
        if active.state != PlanState::Proposal {
            return Ok(None);
        }

        if APPROVALS.contains(&normalized.as_str()) {
            active.state = PlanState::Approved;
            let mut plan = active.plan.clone();
            drop(guard);

            let cancel = self.cancel.lock().await.clone();
            {
                let mut guard = self.active_plan.lock().await;
                if let Some(active) = guard.as_mut() {
                    active.state = PlanState::Executing;
                }
            }
            let (summary, outcome, actions) = self.execute_plan(&mut plan, &cancel).await?;
            let state = if cancel.is_cancelled() {
                PlanState::Cancelled
            } else if plan.status == PlanStatus::Completed {
                PlanState::Completed
            } else {
                PlanState::Failed
            };
            *self.active_plan.lock().await = Some(ActivePlan { plan, state });
            return Ok(Some((summary, outcome, actions)));
        }

        if REJECTIONS.contains(&normalized.as_str()) {
            active.state = PlanState::Rejected;
            *guard = None;
            return Ok(Some((
                "Understood — plan discarded.".to_string(),
                Outcome::Success,
                Vec::new(),
            )));
        }

        Ok(None)
    }

    /// Drive the plan to quiescence: repeatedly pick the highest-priority
    /// runnable task, execute it, adapt on failure, and stop when nothing
    /// can run. Tasks stranded by failed dependencies end up blocked.
    async fn execute_plan(
        &self,
        plan: &mut TaskPlan,
        cancel: &CancellationToken,
    ) -> Result<(String, Outcome, Vec<ActionTaken>)> {
        plan.status = PlanStatus::Executing;
        let mut actions: Vec<ActionTaken> = Vec::new();

        loop {
            if cancel.is_cancelled() {
                for task in plan.tasks.iter_mut() {
                    if task.status == TaskStatus::Pending {
                        task.status = TaskStatus::Blocked;
                    } else if task.status == TaskStatus::InProgress {
                        task.status = TaskStatus::Cancelled;
                    }
                }
                self.editor.cancel_all_pending().await;
                plan.status = PlanStatus::Failed;
                break;
            }

            let Some(task_id) = pick_next(plan) else {
                break;
            };

            let (title, task_snapshot) = {
                let task = plan.task_mut(&task_id).expect("picked task exists");
                task.status = TaskStatus::InProgress;
                task.started = Some(chrono::Utc::now());
                (task.title.clone(), task.clone())
            };
            debug!("plan {}: executing {} ({})", plan.id, task_id, title);

            let dependency_results: Vec<(String, String)> = task_snapshot
                .dependencies
                .iter()
                .filter_map(|dep| plan.task(dep))
                .filter_map(|dep| {
                    dep.result
                        .as_ref()
                        .map(|r| (dep.title.clone(), clip(r, 1200)))
                })
                .collect();

            let outcome = self
                .execute_one_task(&task_snapshot, &dependency_results, cancel, &mut actions)
                .await;

            let task = plan.task_mut(&task_id).expect("picked task exists");
            match outcome {
                Ok(result_text) => {
                    task.result = Some(result_text);
                    task.status = TaskStatus::Completed;
                    task.completed = Some(chrono::Utc::now());
                }
                Err(Error::Cancelled) => {
                    task.status = TaskStatus::Cancelled;
                    continue; // loop top handles the rest
                }
                Err(e) => {
                    task.error = Some(e.to_string());
                    task.status = TaskStatus::Failed;
                    warn!("task {} failed: {}", task_id, e);
                    if let Some(retry_id) = self.planner.adapt(plan, &task_id) {
                        debug!("plan {}: retrying as {}", plan.id, retry_id);
                    }
                }
            }
            plan.refresh_progress();
        }

        // whatever is still pending lost its dependencies
        for task in plan.tasks.iter_mut() {
            if task.status == TaskStatus::Pending {
                task.status = TaskStatus::Blocked;
            }
        }
        plan.refresh_progress();

        let failed = plan
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count();
        if plan.status != PlanStatus::Failed {
            // blocked or cancelled tasks without outright failures still
            // mean the plan fell short
            plan.status = if failed == 0 && plan.progress.completed == plan.progress.total {
                PlanStatus::Completed
            } else {
                PlanStatus::Failed
            };
        }

        let outcome = if plan.status == PlanStatus::Completed {
            Outcome::Success
        } else if plan.progress.completed > 0 {
            Outcome::Partial
        } else {
            Outcome::Failure
        };
        Ok((render_summary(plan), outcome, actions))
    }

    /// One task: gather file context, call the model, and apply the result
    /// through the safe editor when the task targets a single file.
    async fn execute_one_task(
        &self,
        task: &codeforge_core::Task,
        dependency_results: &[(String, String)],
        cancel: &CancellationToken,
        actions: &mut Vec<ActionTaken>,
    ) -> Result<String> {
        let ctx = self.execution_context(cancel);

        // current file contents ground the model's output
        let mut grounding = dependency_results.to_vec();
        for file in task.files_involved.iter().take(5) {
            let result = self
                .orchestrator
                .execute_tool(
                    "filesystem",
                    json!({"operation": "read", "path": file}),
                    &ctx,
                )
                .await;
            if let Some(data) = result.data.filter(|_| result.success) {
                if let Some(content) = data["content"].as_str() {
                    grounding.push((format!("current content of {}", file), clip(content, 2000)));
                }
            }
        }

        let result_text = self
            .planner
            .execute_task(task, &grounding, Some(cancel.clone()))
            .await?;

        let mutates_file = matches!(
            task.task_type,
            TaskType::Implementation | TaskType::Refactoring | TaskType::Documentation
        ) && task.files_involved.len() == 1;

        if mutates_file {
            let file = &task.files_involved[0];
            let content = strip_code_fences(&result_text);
            let proposal = self.editor.create_edit(file, content, Some(&task.title)).await?;
            if !proposal.success {
                return Err(Error::validation(format!(
                    "proposed content for {} failed validation: {}",
                    file,
                    proposal.validation_errors.join("; ")
                )));
            }
            let applied = self.editor.apply_edit(&proposal.edit_id).await?;
            if !applied.success {
                return Err(Error::tool(
                    "editor",
                    applied
                        .error
                        .unwrap_or_else(|| applied.validation_errors.join("; ")),
                ));
            }
            self.project.note_modified(file).await;
            actions.push(ActionTaken {
                description: format!("edited {}", file),
                tool: Some("editor".to_string()),
                success: true,
            });
            return Ok(format!("updated {}", file));
        }

        Ok(result_text)
    }

    /// Auto-execute only for simple questions, or when the user runs an
    /// aggressive risk profile AND the plan itself is low-risk.
    fn should_auto_execute(&self, plan: &TaskPlan, intent: &Intent) -> bool {
        if intent.is_simple_question() {
            return true;
        }
        if self.config.execution_preferences.risk_tolerance != RiskTolerance::Aggressive {
            return false;
        }
        let low_risk = plan.tasks.len() <= 3
            && plan.estimated_duration <= 5
            && intent.risk_level != codeforge_core::RiskLevel::High
            && !plan
                .tasks
                .iter()
                .any(|t| t.priority == TaskPriority::Critical);
        low_risk
    }

    // -----------------------------------------------------------------------
    // Context plumbing
    // -----------------------------------------------------------------------

    fn execution_context(&self, cancel: &CancellationToken) -> ExecutionContext {
        ExecutionContext::new(self.project.root()).with_cancel(cancel.child_token())
    }

    async fn analysis_context(&self, input: &str) -> AnalysisContext {
        let project_summary = if self.config.enable_context_awareness {
            Some(
                self.project
                    .relevant_context(input, CONTEXT_SLICE_TOKENS)
                    .await,
            )
        } else {
            None
        };
        let recent_files = self
            .editor
            .applied_edits()
            .await
            .into_iter()
            .rev()
            .take(5)
            .map(|e| e.file_path.display().to_string())
            .collect();
        // the current turn is already appended, so the previous one is the
        // second-to-last
        let previous_intent = {
            let recent = self.store.recent(&self.session_id, 2).await;
            if recent.len() == 2 {
                recent[0].intent.clone()
            } else {
                None
            }
        };
        AnalysisContext {
            project_summary,
            recent_files,
            working_directory: Some(self.project.root().to_path_buf()),
            previous_intent,
        }
    }

    async fn snapshot(&self) -> ContextSnapshot {
        let recently_modified = self
            .editor
            .applied_edits()
            .await
            .into_iter()
            .rev()
            .take(5)
            .map(|e| e.file_path.display().to_string())
            .collect();
        let active_files = self
            .active_plan
            .lock()
            .await
            .as_ref()
            .map(|a| {
                a.plan
                    .tasks
                    .iter()
                    .flat_map(|t| t.files_involved.iter().cloned())
                    .collect()
            })
            .unwrap_or_default();
        ContextSnapshot {
            working_directory: self.project.root().to_path_buf(),
            active_files,
            recently_modified,
        }
    }
}

/// Highest-priority runnable task, earliest created on ties.
fn pick_next(plan: &TaskPlan) -> Option<String> {
    runnable_tasks(plan)
        .into_iter()
        .filter_map(|id| plan.task(&id).map(|t| (id.clone(), t.priority, t.created)))
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.2.cmp(&a.2)))
        .map(|(id, _, _)| id)
}

fn command_params(name: &str, args: &[String]) -> Value {
    match name {
        "search" => json!({"query": args.join(" ")}),
        "git" => json!({
            "operation": args.first().cloned().unwrap_or_else(|| "status".to_string())
        }),
        "code_analysis" => json!({
            "path": args.first().cloned().unwrap_or_else(|| ".".to_string())
        }),
        "testing" => match args.first() {
            Some(filter) => json!({"filter": filter}),
            None => json!({}),
        },
        "filesystem" => json!({
            "operation": args.first().cloned().unwrap_or_else(|| "list".to_string()),
            "path": args.get(1).cloned().unwrap_or_else(|| ".".to_string()),
        }),
        "execute" => json!({
            "command": args.first().cloned().unwrap_or_default(),
            "args": args.iter().skip(1).collect::<Vec<_>>(),
        }),
        _ => json!({}),
    }
}

fn render_proposal(plan: &TaskPlan) -> String {
    let mut lines = vec![format!(
        "Proposed plan: {} ({} tasks, ≈{} min)",
        plan.title,
        plan.tasks.len(),
        plan.estimated_duration
    )];
    for task in &plan.tasks {
        let deps = if task.dependencies.is_empty() {
            String::new()
        } else {
            format!(" [after {}]", task.dependencies.join(", "))
        };
        lines.push(format!(
            "  {}. {} ({:?}, {} min){}",
            task.id.trim_start_matches("task-"),
            task.title,
            task.task_type,
            task.estimated_duration,
            deps
        ));
    }
    lines.push("Reply \"yes\" to execute or \"no\" to discard.".to_string());
    lines.join("\n")
}

fn render_summary(plan: &TaskPlan) -> String {
    let failed: Vec<&codeforge_core::Task> = plan
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .collect();
    let mut lines = vec![format!(
        "Plan \"{}\": {}/{} tasks completed.",
        plan.title, plan.progress.completed, plan.progress.total
    )];
    for task in &failed {
        lines.push(format!(
            "  failed: {} — {}",
            task.title,
            task.error.as_deref().unwrap_or("unknown error")
        ));
    }
    if !failed.is_empty() || plan.status != PlanStatus::Completed {
        lines.push("You can re-run the request or rephrase it to try again.".to_string());
    }
    lines.join("\n")
}

fn clip(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let end = (0..=max).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
    format!("{}…", &text[..end])
}

/// Models often fence whole-file output; unwrap a single outer fence.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return text.to_string();
    }
    let without_open = match trimmed.find('\n') {
        Some(i) => &trimmed[i + 1..],
        None => return text.to_string(),
    };
    match without_open.rfind("```") {
        Some(i) => without_open[..i].to_string(),
        None => without_open.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_fences() {
        assert_eq!(strip_code_fences("```js\nx=1\n```"), "x=1\n");
        assert_eq!(strip_code_fences("plain"), "plain");
        assert_eq!(strip_code_fences("```\na\n```\n"), "a\n");
    }

    #[test]
    fn clip_respects_char_boundaries() {
        let s = "héllo wörld";
        let clipped = clip(s, 3);
        assert!(clipped.ends_with('…'));
    }

    #[test]
    fn command_params_mapping() {
        let p = command_params("search", &["foo".to_string(), "bar".to_string()]);
        assert_eq!(p["query"], "foo bar");
        let p = command_params("git", &[]);
        assert_eq!(p["operation"], "status");
    }
}
