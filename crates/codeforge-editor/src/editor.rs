//! Safe code editor — propose, validate, apply, roll back
//!
//! Edit lifecycle: proposed → validated → applied, with rejection at
//! validation and rollback after apply. Invariants:
//! (i) a file is never mutated before its original bytes exist under the
//!     backup path;
//! (ii) after `apply_edits` every applied edit has a recoverable backup and
//!     every non-applied edit's file equals its pre-edit content;
//! (iii) pending edits never touch disk.

use crate::validate::{self, ValidationLevel};
use chrono::{DateTime, Utc};
use codeforge_context::ProjectContext;
use codeforge_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A single-file mutation proposal with captured original content.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Edit {
    pub id: String,
    pub file_path: PathBuf,
    pub original_content: String,
    pub new_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    pub applied: bool,
    pub timestamp: DateTime<Utc>,
    pub validation_passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Per-edit status report.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditResult {
    pub edit_id: String,
    pub success: bool,
    #[serde(default)]
    pub validation_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EditResult {
    fn ok(edit_id: impl Into<String>) -> Self {
        Self {
            edit_id: edit_id.into(),
            success: true,
            validation_errors: Vec::new(),
            error: None,
        }
    }

    fn rejected(edit_id: impl Into<String>, validation_errors: Vec<String>) -> Self {
        Self {
            edit_id: edit_id.into(),
            success: false,
            validation_errors,
            error: None,
        }
    }

    fn failed(edit_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            edit_id: edit_id.into(),
            success: false,
            validation_errors: Vec::new(),
            error: Some(error.into()),
        }
    }
}

pub struct SafeCodeEditor {
    root: PathBuf,
    backup_dir: PathBuf,
    validation_level: ValidationLevel,
    project: Option<Arc<ProjectContext>>,
    pending: Mutex<HashMap<String, Edit>>,
    history: Mutex<Vec<Edit>>,
    /// Serializes apply/rollback transactions; one at a time, globally.
    txn: Mutex<()>,
}

impl SafeCodeEditor {
    pub fn new(root: impl AsRef<Path>, backup_dir: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().canonicalize()?;
        let backup_dir = backup_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&backup_dir)?;
        Ok(Self {
            root,
            backup_dir,
            validation_level: ValidationLevel::Syntax,
            project: None,
            pending: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            txn: Mutex::new(()),
        })
    }

    /// Enable SEMANTIC validation against the project index.
    pub fn with_project(mut self, project: Arc<ProjectContext>) -> Self {
        self.project = Some(project);
        if self.validation_level < ValidationLevel::Semantic {
            self.validation_level = ValidationLevel::Semantic;
        }
        self
    }

    pub fn set_validation_level(&mut self, level: ValidationLevel) {
        self.validation_level = level;
    }

    /// Propose an edit. Reads the current content, validates the new
    /// content, and stores the proposal. Never touches disk.
    pub async fn create_edit(
        &self,
        path: impl AsRef<Path>,
        new_content: impl Into<String>,
        description: Option<&str>,
    ) -> Result<EditResult> {
        let resolved = self.resolve(path.as_ref())?;
        let new_content = new_content.into();

        let original_content = match fs::read_to_string(&resolved).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(Error::Io(e)),
        };

        let validation_errors = self.validate(&resolved, &new_content).await;
        let edit = Edit {
            id: uuid::Uuid::new_v4().to_string(),
            file_path: resolved,
            original_content,
            new_content,
            backup_path: None,
            applied: false,
            timestamp: Utc::now(),
            validation_passed: validation_errors.is_empty(),
            description: description.map(String::from),
        };

        let id = edit.id.clone();
        self.pending.lock().await.insert(id.clone(), edit);
        debug!("edit {} proposed ({} validation errors)", id, validation_errors.len());

        if validation_errors.is_empty() {
            Ok(EditResult::ok(id))
        } else {
            Ok(EditResult::rejected(id, validation_errors))
        }
    }

    /// Apply one pending edit: back up the original, then atomically write
    /// the new content.
    pub async fn apply_edit(&self, id: &str) -> Result<EditResult> {
        let _guard = self.txn.lock().await;
        let result = self.apply_one(id).await?;
        Ok(result)
    }

    /// Transactional multi-edit apply. Edits are applied in path order; on
    /// the first failure every edit already applied in this transaction is
    /// rolled back in reverse order. Results come back in input order.
    pub async fn apply_edits(&self, ids: &[String]) -> Result<Vec<EditResult>> {
        let _guard = self.txn.lock().await;

        // sort by path for a deterministic application order
        let mut ordered: Vec<(String, PathBuf)> = Vec::with_capacity(ids.len());
        {
            let pending = self.pending.lock().await;
            for id in ids {
                let edit = pending.get(id).ok_or_else(|| {
                    Error::validation(format!("unknown or already-applied edit: {}", id))
                })?;
                ordered.push((id.clone(), edit.file_path.clone()));
            }
        }
        ordered.sort_by(|a, b| a.1.cmp(&b.1));

        let mut results: HashMap<String, EditResult> = HashMap::new();
        let mut applied_ids: Vec<String> = Vec::new();
        let mut failure: Option<(String, String)> = None;

        for (id, _) in &ordered {
            match self.apply_one(id).await {
                Ok(result) if result.success => {
                    applied_ids.push(id.clone());
                    results.insert(id.clone(), result);
                }
                Ok(result) => {
                    let reason = if result.validation_errors.is_empty() {
                        result.error.clone().unwrap_or_else(|| "apply failed".into())
                    } else {
                        result.validation_errors.join("; ")
                    };
                    failure = Some((id.clone(), reason));
                    results.insert(id.clone(), result);
                    break;
                }
                Err(e) => {
                    failure = Some((id.clone(), e.to_string()));
                    results.insert(id.clone(), EditResult::failed(id.clone(), e.to_string()));
                    break;
                }
            }
        }

        if let Some((failed_id, reason)) = failure {
            // rollback in reverse order; disk returns to the pre-call state
            for id in applied_ids.iter().rev() {
                let result = match self.rollback_one(id).await {
                    Ok(()) => EditResult {
                        edit_id: id.clone(),
                        success: false,
                        validation_errors: vec![format!(
                            "rolled back: edit {} failed ({})",
                            failed_id, reason
                        )],
                        error: None,
                    },
                    Err(e) => {
                        // the edit is still applied on disk; say so instead
                        // of claiming a rollback that did not happen
                        warn!("rollback of {} failed: {}", id, e);
                        EditResult {
                            edit_id: id.clone(),
                            success: false,
                            validation_errors: vec![format!(
                                "rollback failed: {}; original edit error: edit {} failed ({})",
                                e, failed_id, reason
                            )],
                            error: Some(e.to_string()),
                        }
                    }
                };
                results.insert(id.clone(), result);
            }
            // anything never attempted
            for (id, _) in &ordered {
                results.entry(id.clone()).or_insert_with(|| {
                    EditResult::failed(id.clone(), "transaction aborted before this edit")
                });
            }
        }

        Ok(ids
            .iter()
            .map(|id| {
                results
                    .remove(id)
                    .unwrap_or_else(|| EditResult::failed(id.clone(), "not attempted"))
            })
            .collect())
    }

    /// Restore a previously applied edit from its backup.
    pub async fn rollback_edit(&self, id: &str) -> Result<()> {
        let _guard = self.txn.lock().await;
        self.rollback_one(id).await
    }

    /// Drop a pending edit without touching disk.
    pub async fn cancel_edit(&self, id: &str) -> bool {
        self.pending.lock().await.remove(id).is_some()
    }

    /// Discard every pending edit (plan cancellation path).
    pub async fn cancel_all_pending(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let count = pending.len();
        pending.clear();
        count
    }

    pub async fn pending_edits(&self) -> Vec<Edit> {
        self.pending.lock().await.values().cloned().collect()
    }

    /// Edits currently applied on disk (rolled-back ones excluded).
    pub async fn applied_edits(&self) -> Vec<Edit> {
        self.history
            .lock()
            .await
            .iter()
            .filter(|e| e.applied)
            .cloned()
            .collect()
    }

    /// Remove backup files older than `max_age`. Explicit caller operation;
    /// nothing runs this on a schedule.
    pub async fn cleanup_backups(&self, max_age: Duration) -> Result<usize> {
        let mut removed = 0usize;
        let mut dir = fs::read_dir(&self.backup_dir).await?;
        let now = std::time::SystemTime::now();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bak") {
                continue;
            }
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(m) => m,
                Err(_) => continue,
            };
            if now.duration_since(modified).unwrap_or_default() > max_age {
                if fs::remove_file(&path).await.is_ok() {
                    removed += 1;
                }
            }
        }
        debug!("cleanup: removed {} backups", removed);
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // internals (callers hold the txn lock)
    // -----------------------------------------------------------------------

    async fn apply_one(&self, id: &str) -> Result<EditResult> {
        let edit = {
            let pending = self.pending.lock().await;
            pending
                .get(id)
                .cloned()
                .ok_or_else(|| Error::validation(format!("unknown or already-applied edit: {}", id)))?
        };

        // re-validate: the proposal may predate other changes
        let validation_errors = self.validate(&edit.file_path, &edit.new_content).await;
        if !validation_errors.is_empty() {
            return Ok(EditResult::rejected(id, validation_errors));
        }

        // backup before any mutation; failure here is fatal to the edit
        let backup_path = self.backup_path_for(&edit.file_path);
        fs::write(&backup_path, edit.original_content.as_bytes())
            .await
            .map_err(|e| Error::safety(format!("backup write failed: {}", e)))?;

        if let Err(e) = write_atomic(&edit.file_path, &edit.new_content).await {
            let _ = fs::remove_file(&backup_path).await;
            return Ok(EditResult::failed(id, e.to_string()));
        }

        let mut applied = edit;
        applied.backup_path = Some(backup_path);
        applied.applied = true;
        self.pending.lock().await.remove(id);
        self.history.lock().await.push(applied);
        debug!("edit {} applied", id);
        Ok(EditResult::ok(id))
    }

    async fn rollback_one(&self, id: &str) -> Result<()> {
        let (file_path, backup_path) = {
            let history = self.history.lock().await;
            let edit = history
                .iter()
                .find(|e| e.id == id && e.applied)
                .ok_or_else(|| Error::validation(format!("no applied edit with id {}", id)))?;
            let backup = edit
                .backup_path
                .clone()
                .ok_or_else(|| Error::safety(format!("applied edit {} has no backup", id)))?;
            (edit.file_path.clone(), backup)
        };

        let original = fs::read_to_string(&backup_path)
            .await
            .map_err(|e| Error::safety(format!("backup unreadable: {}", e)))?;
        write_atomic(&file_path, &original).await?;

        let mut history = self.history.lock().await;
        if let Some(edit) = history.iter_mut().find(|e| e.id == id) {
            edit.applied = false;
        }
        debug!("edit {} rolled back", id);
        Ok(())
    }

    async fn validate(&self, path: &Path, content: &str) -> Vec<String> {
        let mut errors = validate::validate_syntax(path, content);
        if self.validation_level >= ValidationLevel::Semantic {
            if let Some(project) = &self.project {
                errors.extend(validate::validate_semantic(path, content, project).await);
            }
        }
        errors
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        // canonicalize the parent; the leaf may not exist yet
        let parent = joined
            .parent()
            .ok_or_else(|| Error::safety("path has no parent".to_string()))?;
        let file_name = joined
            .file_name()
            .ok_or_else(|| Error::safety("path has no file name".to_string()))?;
        let resolved_parent = parent
            .canonicalize()
            .map_err(|e| Error::safety(format!("cannot resolve {}: {}", parent.display(), e)))?;
        let resolved = resolved_parent.join(file_name);
        if !resolved.starts_with(&self.root) {
            return Err(Error::safety(format!(
                "path escapes project root: {}",
                path.display()
            )));
        }
        Ok(resolved)
    }

    /// `<backupDir>/<sha1(path)>-<unix_ms>.bak`, raw original bytes.
    fn backup_path_for(&self, path: &Path) -> PathBuf {
        let mut hasher = Sha1::new();
        hasher.update(path.to_string_lossy().as_bytes());
        let digest = hasher.finalize();
        let name = format!("{:x}-{}.bak", digest, Utc::now().timestamp_millis());
        self.backup_dir.join(name)
    }
}

async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
    fs::write(&tmp, content).await?;
    match fs::rename(&tmp, path).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp).await;
            Err(Error::Io(e))
        }
    }
}
