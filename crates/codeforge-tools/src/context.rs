//! Execution context passed into every tool call

use crate::safety;
use codeforge_core::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Ambient state for one tool invocation. The working directory always
/// resolves under the project root; `with_working_directory` enforces it.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    pub project_root: PathBuf,
    pub working_directory: PathBuf,
    pub environment: HashMap<String, String>,
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref().to_path_buf();
        Self {
            working_directory: root.clone(),
            project_root: root,
            environment: HashMap::new(),
            timeout: Duration::from_secs(30),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_working_directory(mut self, dir: impl AsRef<Path>) -> Result<Self> {
        self.working_directory =
            safety::resolve_at_root(&self.project_root, dir.as_ref())?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Resolve a tool-supplied path against the working directory, rejecting
    /// anything that lands outside the project root.
    pub fn resolve(&self, candidate: impl AsRef<Path>) -> Result<PathBuf> {
        safety::resolve_in_root(&self.project_root, &self.working_directory, candidate.as_ref())
    }

    /// A token that is cancelled when the parent is, for per-tool scoping.
    pub fn child_cancel(&self) -> CancellationToken {
        self.cancel.child_token()
    }
}
