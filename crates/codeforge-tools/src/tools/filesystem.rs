//! Filesystem tool — read, write, list, create, delete, exists, search
//!
//! Every path resolves against the context working directory and must land
//! inside the project root. Writes are atomic: temp file in the target
//! directory, then rename.

use crate::context::ExecutionContext;
use crate::registry::{ParamType, Tool, ToolParameter, ToolResult};
use serde_json::{json, Value};
use std::path::Path;
use tokio::fs;
use tracing::debug;

const OPERATIONS: &[&str] = &[
    "read", "write", "list", "create", "delete", "exists", "search",
];

pub struct FileSystemTool;

impl FileSystemTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FileSystemTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for FileSystemTool {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn category(&self) -> &str {
        "filesystem"
    }

    fn description(&self) -> &str {
        "Read, write, list, create, delete and search files inside the project root. \
         Writes are atomic; paths outside the project are rejected."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("operation", ParamType::String, "One of read, write, list, create, delete, exists, search")
                .with_validator(|v| {
                    let op = v.as_str().unwrap_or_default();
                    if OPERATIONS.contains(&op) {
                        Ok(())
                    } else {
                        Err(format!("unknown operation '{}'", op))
                    }
                }),
            ToolParameter::required("path", ParamType::String, "Path relative to the working directory"),
            ToolParameter::optional("content", ParamType::String, "Content for write/create"),
            ToolParameter::optional("directory", ParamType::Boolean, "create: make a directory instead of a file")
                .with_default(json!(false)),
            ToolParameter::optional("recursive", ParamType::Boolean, "delete/list: recurse into directories")
                .with_default(json!(false)),
            ToolParameter::optional("pattern", ParamType::String, "search: substring to match in file names"),
        ]
    }

    fn examples(&self) -> Vec<String> {
        vec![
            r#"{"operation": "read", "path": "src/main.rs"}"#.to_string(),
            r##"{"operation": "write", "path": "notes.md", "content": "# Notes"}"##.to_string(),
            r#"{"operation": "search", "path": "src", "pattern": "test"}"#.to_string(),
        ]
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult {
        let operation = params["operation"].as_str().unwrap_or_default();
        let raw_path = params["path"].as_str().unwrap_or_default();

        let path = match ctx.resolve(raw_path) {
            Ok(p) => p,
            Err(e) => return ToolResult::fail(e.to_string()),
        };

        debug!("filesystem {}: {}", operation, raw_path);
        match operation {
            "read" => read_file(&path).await,
            "write" => {
                let content = params["content"].as_str().unwrap_or_default();
                write_atomic(&path, content).await
            }
            "list" => list_dir(&path, params["recursive"].as_bool().unwrap_or(false)).await,
            "create" => {
                if params["directory"].as_bool().unwrap_or(false) {
                    match fs::create_dir_all(&path).await {
                        Ok(()) => ToolResult::ok(json!({"created": raw_path, "directory": true})),
                        Err(e) => ToolResult::fail(e.to_string()),
                    }
                } else {
                    if path.exists() {
                        return ToolResult::fail(format!("already exists: {}", raw_path));
                    }
                    let content = params["content"].as_str().unwrap_or_default();
                    write_atomic(&path, content).await
                }
            }
            "delete" => delete(&path, params["recursive"].as_bool().unwrap_or(false)).await,
            "exists" => ToolResult::ok(json!({"path": raw_path, "exists": path.exists()})),
            "search" => {
                let pattern = params["pattern"].as_str().unwrap_or_default();
                search_names(&path, pattern)
            }
            other => ToolResult::fail(format!("unknown operation '{}'", other)),
        }
    }
}

async fn read_file(path: &Path) -> ToolResult {
    let bytes = match fs::read(path).await {
        Ok(b) => b,
        Err(e) => return ToolResult::fail(e.to_string()),
    };
    if is_binary(&bytes) {
        return ToolResult::fail(format!("binary file: {}", path.display()));
    }
    match String::from_utf8(bytes) {
        Ok(content) => {
            let lines = content.lines().count();
            ToolResult::ok(json!({"content": content, "lines": lines}))
        }
        Err(_) => ToolResult::fail(format!("not valid UTF-8: {}", path.display())),
    }
}

/// Write via a temp file in the same directory, then rename. The rename is
/// atomic within one filesystem, so readers never observe a partial write.
pub async fn write_atomic(path: &Path, content: &str) -> ToolResult {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent).await {
            return ToolResult::fail(e.to_string());
        }
    }
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
    if let Err(e) = fs::write(&tmp, content).await {
        return ToolResult::fail(e.to_string());
    }
    match fs::rename(&tmp, path).await {
        Ok(()) => ToolResult::ok(json!({"written": path.display().to_string(), "bytes": content.len()})),
        Err(e) => {
            let _ = fs::remove_file(&tmp).await;
            ToolResult::fail(e.to_string())
        }
    }
}

async fn list_dir(path: &Path, recursive: bool) -> ToolResult {
    let mut entries: Vec<Value> = Vec::new();
    if recursive {
        for entry in walkdir::WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .skip(1)
        {
            entries.push(json!({
                "path": entry.path().display().to_string(),
                "directory": entry.file_type().is_dir(),
            }));
        }
    } else {
        let mut dir = match fs::read_dir(path).await {
            Ok(d) => d,
            Err(e) => return ToolResult::fail(e.to_string()),
        };
        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => {
                    let is_dir = entry
                        .file_type()
                        .await
                        .map(|t| t.is_dir())
                        .unwrap_or(false);
                    entries.push(json!({
                        "path": entry.path().display().to_string(),
                        "directory": is_dir,
                    }));
                }
                Ok(None) => break,
                Err(e) => return ToolResult::fail(e.to_string()),
            }
        }
    }
    entries.sort_by(|a, b| a["path"].as_str().cmp(&b["path"].as_str()));
    ToolResult::ok(json!({"entries": entries, "count": entries.len()}))
}

async fn delete(path: &Path, recursive: bool) -> ToolResult {
    let result = if path.is_dir() {
        if recursive {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_dir(path).await
        }
    } else {
        fs::remove_file(path).await
    };
    match result {
        Ok(()) => ToolResult::ok(json!({"deleted": path.display().to_string()})),
        Err(e) => ToolResult::fail(e.to_string()),
    }
}

fn search_names(path: &Path, pattern: &str) -> ToolResult {
    if pattern.is_empty() {
        return ToolResult::fail("search requires a non-empty pattern".to_string());
    }
    let needle = pattern.to_lowercase();
    let mut matches: Vec<String> = Vec::new();
    for entry in walkdir::WalkDir::new(path)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && name != "node_modules" && name != "target"
        })
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.contains(&needle) {
            matches.push(entry.path().display().to_string());
        }
        if matches.len() >= 500 {
            break;
        }
    }
    matches.sort();
    ToolResult::ok(json!({"matches": matches, "count": matches.len()}))
}

/// NUL in the first 512 bytes marks the file as binary.
pub fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(512).any(|b| *b == 0)
}
