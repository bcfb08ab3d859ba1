//! Git tool — read-only repository inspection
//!
//! Shells out to `git` with a fixed argv per operation; nothing here can
//! mutate the repository.

use crate::context::ExecutionContext;
use crate::registry::{ParamType, Tool, ToolParameter, ToolResult};
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

pub struct GitTool;

impl GitTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GitTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for GitTool {
    fn name(&self) -> &str {
        "git"
    }

    fn category(&self) -> &str {
        "git"
    }

    fn description(&self) -> &str {
        "Inspect the git repository: status, log, diff, and branches. Read-only."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("operation", ParamType::String, "One of status, log, diff, branch")
                .with_validator(|v| match v.as_str() {
                    Some("status" | "log" | "diff" | "branch") => Ok(()),
                    _ => Err("must be status, log, diff, or branch".to_string()),
                }),
            ToolParameter::optional("path", ParamType::String, "Limit diff/log to a path"),
            ToolParameter::optional("maxCount", ParamType::Integer, "log: number of commits")
                .with_default(json!(10)),
            ToolParameter::optional("staged", ParamType::Boolean, "diff: staged changes only")
                .with_default(json!(false)),
        ]
    }

    fn examples(&self) -> Vec<String> {
        vec![
            r#"{"operation": "status"}"#.to_string(),
            r#"{"operation": "log", "maxCount": 5}"#.to_string(),
        ]
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult {
        let operation = params["operation"].as_str().unwrap_or_default();

        let mut argv: Vec<String> = match operation {
            "status" => vec!["status".into(), "--porcelain".into(), "--branch".into()],
            "log" => {
                let count = params["maxCount"].as_u64().unwrap_or(10);
                vec![
                    "log".into(),
                    format!("--max-count={}", count),
                    "--pretty=format:%h %ad %s".into(),
                    "--date=short".into(),
                ]
            }
            "diff" => {
                let mut v: Vec<String> = vec!["diff".into(), "--stat".into()];
                if params["staged"].as_bool().unwrap_or(false) {
                    v.push("--cached".into());
                }
                v
            }
            "branch" => vec!["branch".into(), "--list".into(), "--no-color".into()],
            other => return ToolResult::fail(format!("unknown operation '{}'", other)),
        };

        if let Some(path) = params["path"].as_str() {
            let resolved = match ctx.resolve(path) {
                Ok(p) => p,
                Err(e) => return ToolResult::fail(e.to_string()),
            };
            argv.push("--".into());
            argv.push(resolved.display().to_string());
        }

        debug!("git {:?}", argv);
        let output = match tokio::time::timeout(
            ctx.timeout,
            Command::new("git")
                .args(&argv)
                .current_dir(&ctx.working_directory)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::fail(format!("failed to run git: {}", e)),
            Err(_) => {
                return ToolResult::fail(format!("timed out after {}ms", ctx.timeout.as_millis()))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return ToolResult::fail(format!(
                "git {} failed: {}",
                operation,
                stderr.trim()
            ));
        }

        let data = match operation {
            "status" => parse_status(&stdout),
            "branch" => json!({
                "branches": stdout
                    .lines()
                    .map(|l| l.trim_start_matches("* ").trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>(),
                "current": stdout
                    .lines()
                    .find(|l| l.starts_with('*'))
                    .map(|l| l.trim_start_matches("* ").trim().to_string()),
            }),
            _ => json!({"output": stdout}),
        };
        ToolResult::ok(data)
    }
}

fn parse_status(porcelain: &str) -> Value {
    let mut branch = None;
    let mut changes: Vec<Value> = Vec::new();
    for line in porcelain.lines() {
        if let Some(rest) = line.strip_prefix("## ") {
            branch = Some(rest.split("...").next().unwrap_or(rest).to_string());
        } else if line.len() > 3 {
            changes.push(json!({
                "status": line[..2].trim().to_string(),
                "path": line[3..].to_string(),
            }));
        }
    }
    json!({
        "branch": branch,
        "changes": changes,
        "clean": changes.is_empty(),
    })
}
