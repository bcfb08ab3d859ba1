//! Tool orchestrator — dependency-ordered execution of tool invocations
//!
//! A plan is a flat list of executions with declared dependencies. The
//! scheduler repeatedly launches every execution whose dependencies have
//! completed, bounded by `max_concurrent_tools`, and wakes on the first
//! finish. A failed execution blocks its transitive dependents; the plan
//! runs the remaining branches to quiescence. Retries are the planner's
//! concern — the orchestrator only re-attempts io-flavored failures, once.

use crate::context::ExecutionContext;
use crate::registry::{validate_params, ToolRegistry, ToolResult};
use codeforge_core::{Error, Result, TaskPriority};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub max_concurrent_tools: usize,
    pub enable_cache: bool,
    pub cache_ttl: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tools: 4,
            enable_cache: false,
            cache_ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Blocked,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// One tool invocation inside an orchestration plan.
#[derive(Clone, Debug)]
pub struct Execution {
    pub id: String,
    pub tool_name: String,
    pub parameters: Value,
    pub dependencies: Vec<String>,
    pub priority: TaskPriority,
    pub status: ExecutionStatus,
}

/// Input to `OrchestrationPlan::build`. Dependencies reference earlier
/// requests by position; ids are assigned at build time.
#[derive(Clone, Debug)]
pub struct ExecutionRequest {
    pub tool_name: String,
    pub parameters: Value,
    pub depends_on: Vec<usize>,
    pub priority: TaskPriority,
}

impl ExecutionRequest {
    pub fn new(tool_name: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
            depends_on: Vec::new(),
            priority: TaskPriority::Medium,
        }
    }

    pub fn depends_on(mut self, index: usize) -> Self {
        self.depends_on.push(index);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Clone, Debug)]
pub struct OrchestrationPlan {
    pub id: String,
    pub executions: Vec<Execution>,
    /// execution id → ids it depends on
    pub dependency_map: HashMap<String, Vec<String>>,
    pub estimated_duration: Duration,
}

impl OrchestrationPlan {
    /// Assign ids, translate positional dependencies, and estimate the
    /// duration. Forward or self references are validation errors.
    pub fn build(requests: Vec<ExecutionRequest>) -> Result<Self> {
        let ids: Vec<String> = requests
            .iter()
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect();

        let mut executions = Vec::with_capacity(requests.len());
        let mut dependency_map = HashMap::new();
        for (index, request) in requests.into_iter().enumerate() {
            let mut dependencies = Vec::with_capacity(request.depends_on.len());
            for dep in &request.depends_on {
                if *dep >= index {
                    return Err(Error::validation(format!(
                        "execution {} depends on {} which is not an earlier entry",
                        index, dep
                    )));
                }
                dependencies.push(ids[*dep].clone());
            }
            dependency_map.insert(ids[index].clone(), dependencies.clone());
            executions.push(Execution {
                id: ids[index].clone(),
                tool_name: request.tool_name,
                parameters: request.parameters,
                dependencies,
                priority: request.priority,
                status: ExecutionStatus::Pending,
            });
        }

        let estimated_duration = Duration::from_secs(executions.len() as u64);
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            executions,
            dependency_map,
            estimated_duration,
        })
    }

    pub fn execution(&self, id: &str) -> Option<&Execution> {
        self.executions.iter().find(|e| e.id == id)
    }

    fn dependents_of(&self, id: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut frontier = vec![id.to_string()];
        while let Some(current) = frontier.pop() {
            for execution in &self.executions {
                if execution.dependencies.contains(&current) && !out.contains(&execution.id) {
                    out.push(execution.id.clone());
                    frontier.push(execution.id.clone());
                }
            }
        }
        out
    }
}

/// Lifecycle events emitted around each execution.
#[derive(Clone, Debug)]
pub enum ToolEvent {
    Started {
        execution_id: String,
        tool: String,
    },
    Completed {
        execution_id: String,
        tool: String,
        duration_ms: u64,
    },
    Failed {
        execution_id: String,
        tool: String,
        error: String,
    },
}

struct CacheEntry {
    result: ToolResult,
    inserted: Instant,
}

#[derive(Clone)]
struct Shared {
    registry: Arc<ToolRegistry>,
    config: OrchestratorConfig,
    cache: Arc<DashMap<String, CacheEntry>>,
    event_tx: Option<mpsc::Sender<ToolEvent>>,
}

impl Shared {
    async fn emit(&self, event: ToolEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Validate, consult the cache, run with timeout, retry io failures
    /// once, and stamp the execution time.
    async fn run(&self, execution_id: &str, name: &str, params: Value, ctx: &ExecutionContext) -> ToolResult {
        if ctx.cancel.is_cancelled() {
            return ToolResult::cancelled();
        }

        let tool = match self.registry.get(name) {
            Some(t) => t,
            None => return ToolResult::fail(format!("tool not found: {}", name)),
        };

        let params = match validate_params(tool.as_ref(), &params) {
            Ok(p) => p,
            Err(e) => return ToolResult::fail(e.to_string()),
        };

        let cache_key = if self.config.enable_cache {
            // serde_json maps are sorted, so this string is canonical
            Some(format!(
                "{}:{}:{}",
                name,
                params,
                ctx.project_root.display()
            ))
        } else {
            None
        };
        if let Some(key) = &cache_key {
            if let Some(entry) = self.cache.get(key) {
                if entry.inserted.elapsed() < self.config.cache_ttl {
                    debug!("cache hit for tool '{}'", name);
                    return entry.result.clone();
                }
            }
            self.cache.remove(key);
        }

        self.emit(ToolEvent::Started {
            execution_id: execution_id.to_string(),
            tool: name.to_string(),
        })
        .await;

        let started = Instant::now();
        let mut result = run_attempt(tool.as_ref(), params.clone(), ctx).await;

        if result.is_io_failure() && !ctx.cancel.is_cancelled() {
            debug!("retrying io failure of tool '{}' once", name);
            tokio::time::sleep(Duration::from_millis(100)).await;
            result = run_attempt(tool.as_ref(), params, ctx).await;
        }

        result.metadata.execution_time = started.elapsed().as_millis() as u64;

        if result.success {
            if let Some(key) = cache_key {
                self.cache.insert(
                    key,
                    CacheEntry {
                        result: result.clone(),
                        inserted: Instant::now(),
                    },
                );
            }
            self.emit(ToolEvent::Completed {
                execution_id: execution_id.to_string(),
                tool: name.to_string(),
                duration_ms: result.metadata.execution_time,
            })
            .await;
        } else {
            self.emit(ToolEvent::Failed {
                execution_id: execution_id.to_string(),
                tool: name.to_string(),
                error: result.error.clone().unwrap_or_default(),
            })
            .await;
        }

        result
    }
}

async fn run_attempt(
    tool: &dyn crate::registry::Tool,
    params: Value,
    ctx: &ExecutionContext,
) -> ToolResult {
    match tokio::time::timeout(ctx.timeout, tool.execute_cancellable(params, ctx)).await {
        Ok(result) => result,
        Err(_) => ToolResult::fail(format!("timed out after {}ms", ctx.timeout.as_millis())),
    }
}

pub struct ToolOrchestrator {
    shared: Shared,
}

impl ToolOrchestrator {
    pub fn new(registry: Arc<ToolRegistry>, config: OrchestratorConfig) -> Self {
        Self {
            shared: Shared {
                registry,
                config,
                cache: Arc::new(DashMap::new()),
                event_tx: None,
            },
        }
    }

    /// Attach a lifecycle event channel.
    pub fn with_events(mut self, tx: mpsc::Sender<ToolEvent>) -> Self {
        self.shared.event_tx = Some(tx);
        self
    }

    pub fn clear_cache(&self) {
        self.shared.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.shared.cache.len()
    }

    /// Execute a single tool invocation.
    pub async fn execute_tool(
        &self,
        name: &str,
        params: Value,
        ctx: &ExecutionContext,
    ) -> ToolResult {
        let id = uuid::Uuid::new_v4().to_string();
        self.shared.run(&id, name, params, ctx).await
    }

    /// Execute every invocation in the plan, honoring dependencies, the
    /// concurrency bound, and cancellation. Statuses are updated in place;
    /// the returned map has one terminal `ToolResult` per execution.
    pub async fn execute_orchestration(
        &self,
        plan: &mut OrchestrationPlan,
        ctx: &ExecutionContext,
    ) -> Result<HashMap<String, ToolResult>> {
        let mut results: HashMap<String, ToolResult> = HashMap::new();
        let mut join_set: JoinSet<(String, ToolResult)> = JoinSet::new();

        loop {
            if ctx.cancel.is_cancelled() {
                join_set.shutdown().await;
                for execution in plan.executions.iter_mut() {
                    if !execution.status.is_terminal() {
                        execution.status = ExecutionStatus::Cancelled;
                        results.insert(execution.id.clone(), ToolResult::cancelled());
                    }
                }
                break;
            }

            if plan.executions.iter().all(|e| e.status.is_terminal()) {
                break;
            }

            // Launch every ready execution up to the concurrency bound,
            // highest priority first, then insertion order.
            let slots = self
                .shared
                .config
                .max_concurrent_tools
                .saturating_sub(join_set.len());
            if slots > 0 {
                let completed: Vec<String> = plan
                    .executions
                    .iter()
                    .filter(|e| e.status == ExecutionStatus::Completed)
                    .map(|e| e.id.clone())
                    .collect();
                let mut ready: Vec<usize> = plan
                    .executions
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| {
                        e.status == ExecutionStatus::Pending
                            && e.dependencies.iter().all(|d| completed.contains(d))
                    })
                    .map(|(i, _)| i)
                    .collect();
                ready.sort_by(|&a, &b| {
                    plan.executions[b]
                        .priority
                        .cmp(&plan.executions[a].priority)
                        .then(a.cmp(&b))
                });

                let mut binding_failures: Vec<String> = Vec::new();
                for index in ready.into_iter().take(slots) {
                    let (id, name, raw_params) = {
                        let execution = &plan.executions[index];
                        (
                            execution.id.clone(),
                            execution.tool_name.clone(),
                            execution.parameters.clone(),
                        )
                    };
                    let params = match resolve_bindings(&raw_params, &results) {
                        Ok(p) => p,
                        Err(e) => {
                            plan.executions[index].status = ExecutionStatus::Failed;
                            results.insert(id.clone(), ToolResult::fail(e.to_string()));
                            binding_failures.push(id);
                            continue;
                        }
                    };
                    plan.executions[index].status = ExecutionStatus::Running;
                    let shared = self.shared.clone();
                    let task_ctx = ctx.clone();
                    join_set.spawn(async move {
                        let result = shared.run(&id, &name, params, &task_ctx).await;
                        (id, result)
                    });
                }
                for id in binding_failures {
                    block_dependents(plan, &id, &mut results);
                }
            }

            if join_set.is_empty() {
                // Nothing running and nothing launchable: whatever is left
                // cannot make progress because a dependency failed.
                for execution in plan.executions.iter_mut() {
                    if execution.status == ExecutionStatus::Pending {
                        execution.status = ExecutionStatus::Blocked;
                        results.insert(
                            execution.id.clone(),
                            ToolResult::fail("blocked: dependency did not complete"),
                        );
                    }
                }
                if plan.executions.iter().all(|e| e.status.is_terminal()) {
                    break;
                }
                continue;
            }

            match join_set.join_next().await {
                Some(Ok((id, result))) => {
                    let status = if result.is_cancelled() {
                        ExecutionStatus::Cancelled
                    } else if result.success {
                        ExecutionStatus::Completed
                    } else {
                        ExecutionStatus::Failed
                    };
                    if let Some(execution) =
                        plan.executions.iter_mut().find(|e| e.id == id)
                    {
                        execution.status = status;
                    }
                    if status != ExecutionStatus::Completed {
                        block_dependents(plan, &id, &mut results);
                    }
                    results.insert(id, result);
                }
                Some(Err(e)) => {
                    warn!("orchestrated execution panicked: {}", e);
                }
                None => {}
            }
        }

        Ok(results)
    }
}

fn block_dependents(
    plan: &mut OrchestrationPlan,
    failed_id: &str,
    results: &mut HashMap<String, ToolResult>,
) {
    for dependent_id in plan.dependents_of(failed_id) {
        if let Some(execution) = plan
            .executions
            .iter_mut()
            .find(|e| e.id == dependent_id && !e.status.is_terminal())
        {
            execution.status = ExecutionStatus::Blocked;
            results.insert(
                dependent_id.clone(),
                ToolResult::fail(format!("blocked: dependency {} failed", failed_id)),
            );
        }
    }
}

/// Replace `{"from": "<exec id>", "path": "data.x"}` objects anywhere in a
/// parameter tree with the referenced execution's result. Dependents must
/// reference results by execution id, never by position.
fn resolve_bindings(params: &Value, results: &HashMap<String, ToolResult>) -> Result<Value> {
    match params {
        Value::Object(map) => {
            if let Some(Value::String(from)) = map.get("from") {
                let path_only_keys = map
                    .keys()
                    .all(|k| k == "from" || k == "path");
                if path_only_keys {
                    let result = results.get(from).ok_or_else(|| {
                        Error::validation(format!(
                            "binding references unknown execution '{}'",
                            from
                        ))
                    })?;
                    let tree = serde_json::to_value(result)?;
                    let resolved = match map.get("path").and_then(Value::as_str) {
                        Some(path) => navigate(&tree, path),
                        None => tree,
                    };
                    return Ok(resolved);
                }
            }
            let mut out = Map::new();
            for (key, value) in map {
                out.insert(key.clone(), resolve_bindings(value, results)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|v| resolve_bindings(v, results))
                .collect::<Result<Vec<_>>>()?,
        )),
        other => Ok(other.clone()),
    }
}

fn navigate(tree: &Value, path: &str) -> Value {
    let mut current = tree;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => {
                debug!("binding path '{}' missing segment '{}'", path, segment);
                return Value::Null;
            }
        }
    }
    current.clone()
}
