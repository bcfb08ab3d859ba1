//! Tool registry and trait definitions
//!
//! Each tool is a self-contained module implementing the Tool trait. Tools
//! are stateless with respect to the registry; anything mutable lives in the
//! surrounding system. Parameter schemas are data, and validators are
//! closures stored alongside the parameter metadata.

use crate::context::ExecutionContext;
use codeforge_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Declared parameter types for tool inputs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

pub type ParamValidator = Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

/// Metadata for one declared tool parameter.
#[derive(Clone)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    pub default: Option<Value>,
    pub validator: Option<ParamValidator>,
}

impl std::fmt::Debug for ToolParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolParameter")
            .field("name", &self.name)
            .field("param_type", &self.param_type)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

impl ToolParameter {
    pub fn required(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
            validator: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: false,
            default: None,
            validator: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_validator(
        mut self,
        validator: impl Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }
}

/// Identity block every registered tool must fill in.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolMetadata {
    pub name: String,
    pub category: String,
    pub version: String,
    pub description: String,
}

/// Result envelope for every tool call. Metadata keys are camelCase on the
/// wire.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: ResultMetadata,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub execution_time: u64,
    #[serde(default)]
    pub resources_used: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: ResultMetadata::default(),
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            metadata: ResultMetadata::default(),
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: ResultMetadata::default(),
        }
    }

    pub fn cancelled() -> Self {
        Self::fail("cancelled")
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.metadata.warnings.push(warning.into());
        self
    }

    pub fn with_execution_time(mut self, millis: u64) -> Self {
        self.metadata.execution_time = millis;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_deref() == Some("cancelled")
    }

    /// Io-flavored failures get one orchestrator retry. Tools format io
    /// errors through `std::io::Error`, whose Display carries the os-error
    /// marker.
    pub fn is_io_failure(&self) -> bool {
        !self.success
            && self
                .error
                .as_deref()
                .map(|e| e.contains("os error") || e.contains("io error"))
                .unwrap_or(false)
    }
}

/// The Tool trait — implement this to add a new capability.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (e.g. "filesystem", "search").
    fn name(&self) -> &str;

    /// Grouping used by `by_category` lookups.
    fn category(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str;

    /// Declared parameter schema; validated before every execute.
    fn parameters(&self) -> Vec<ToolParameter> {
        Vec::new()
    }

    /// Example invocations, used by search ranking and help output.
    fn examples(&self) -> Vec<String> {
        Vec::new()
    }

    /// Execute with validated parameters. Implementations must not retain
    /// state across calls.
    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult;

    /// Execute racing the context's cancel token. Tools that manage child
    /// processes override this to kill the child on cancellation.
    async fn execute_cancellable(&self, params: Value, ctx: &ExecutionContext) -> ToolResult {
        let cancel: CancellationToken = ctx.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => ToolResult::cancelled(),
            result = self.execute(params, ctx) => result,
        }
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: self.name().to_string(),
            category: self.category().to_string(),
            version: self.version().to_string(),
            description: self.description().to_string(),
        }
    }
}

/// Global tool lookup. Read-mostly: register/unregister take the write
/// lock, everything else shares the read lock.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool after validating its metadata. Re-registration
    /// overwrites the previous entry with a warning.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        validate_metadata(tool.as_ref())?;
        let name = tool.name().to_string();
        let mut tools = self.tools.write().expect("registry lock poisoned");
        if tools.insert(name.clone(), tool).is_some() {
            warn!("tool '{}' re-registered, previous entry replaced", name);
        }
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.tools
            .write()
            .expect("registry lock poisoned")
            .remove(name)
            .is_some()
    }

    /// Total: absent names simply return None.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn list(&self) -> Vec<ToolMetadata> {
        let mut out: Vec<ToolMetadata> = self
            .tools
            .read()
            .expect("registry lock poisoned")
            .values()
            .map(|t| t.metadata())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn names(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .tools
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        out.sort();
        out
    }

    pub fn by_category(&self, category: &str) -> Vec<Arc<dyn Tool>> {
        let mut out: Vec<Arc<dyn Tool>> = self
            .tools
            .read()
            .expect("registry lock poisoned")
            .values()
            .filter(|t| t.category().eq_ignore_ascii_case(category))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name().cmp(b.name()));
        out
    }

    /// Free-text search, ranked: name match > description match >
    /// parameter name/description match.
    pub fn search(&self, query: &str) -> Vec<Arc<dyn Tool>> {
        let query = query.to_lowercase();
        let mut scored: Vec<(Arc<dyn Tool>, u32)> = self
            .tools
            .read()
            .expect("registry lock poisoned")
            .values()
            .filter_map(|t| {
                let score = search_score(t.as_ref(), &query);
                if score > 0 {
                    Some((t.clone(), score))
                } else {
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.name().cmp(b.0.name())));
        scored.into_iter().map(|(t, _)| t).collect()
    }
}

fn search_score(tool: &dyn Tool, query: &str) -> u32 {
    let mut score = 0;
    let name = tool.name().to_lowercase();
    if name == *query {
        score += 100;
    } else if name.contains(query) {
        score += 50;
    }
    if tool.description().to_lowercase().contains(query) {
        score += 25;
    }
    for param in tool.parameters() {
        if param.name.to_lowercase().contains(query)
            || param.description.to_lowercase().contains(query)
        {
            score += 10;
        }
    }
    score
}

fn validate_metadata(tool: &dyn Tool) -> Result<()> {
    if tool.name().trim().is_empty() {
        return Err(Error::validation("tool name must not be empty"));
    }
    if tool.description().trim().is_empty() {
        return Err(Error::validation(format!(
            "tool '{}' has an empty description",
            tool.name()
        )));
    }
    if tool.category().trim().is_empty() {
        return Err(Error::validation(format!(
            "tool '{}' has an empty category",
            tool.name()
        )));
    }
    if tool.version().trim().is_empty() {
        return Err(Error::validation(format!(
            "tool '{}' has an empty version",
            tool.name()
        )));
    }
    for param in tool.parameters() {
        if param.name.trim().is_empty() || param.description.trim().is_empty() {
            return Err(Error::validation(format!(
                "tool '{}' declares a parameter without name or description",
                tool.name()
            )));
        }
    }
    Ok(())
}

/// Validate `params` against a tool's declared schema: required parameters
/// present, types match, per-parameter validators pass. Defaults are filled
/// in for missing optionals. Returns the effective parameter object.
pub fn validate_params(tool: &dyn Tool, params: &Value) -> Result<Value> {
    let mut effective = match params {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        _ => {
            return Err(Error::validation(format!(
                "tool '{}' parameters must be an object",
                tool.name()
            )))
        }
    };

    for param in tool.parameters() {
        match effective.get(&param.name) {
            Some(value) if !value.is_null() => {
                if !param.param_type.matches(value) {
                    return Err(Error::validation(format!(
                        "parameter '{}' of tool '{}' has the wrong type",
                        param.name,
                        tool.name()
                    )));
                }
                if let Some(validator) = &param.validator {
                    validator(value).map_err(|reason| {
                        Error::validation(format!(
                            "parameter '{}' of tool '{}' is invalid: {}",
                            param.name,
                            tool.name(),
                            reason
                        ))
                    })?;
                }
            }
            _ => {
                if param.required {
                    return Err(Error::validation(format!(
                        "missing required parameter '{}' for tool '{}'",
                        param.name,
                        tool.name()
                    )));
                }
                if let Some(default) = &param.default {
                    effective.insert(param.name.clone(), default.clone());
                }
            }
        }
    }

    Ok(Value::Object(effective))
}
