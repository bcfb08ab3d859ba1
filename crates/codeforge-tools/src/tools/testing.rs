//! Testing tool — detect and run the project's test suite
//!
//! The runner is detected from manifest files; only known runner binaries
//! are ever spawned, so the execute denylist is not in play here.

use crate::context::ExecutionContext;
use crate::registry::{ParamType, Tool, ToolParameter, ToolResult};
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

pub struct TestingTool;

impl TestingTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TestingTool {
    fn default() -> Self {
        Self::new()
    }
}

struct Runner {
    framework: &'static str,
    program: &'static str,
    args: Vec<String>,
}

fn detect_runner(root: &Path, filter: Option<&str>) -> Option<Runner> {
    if root.join("Cargo.toml").exists() {
        let mut args = vec!["test".to_string()];
        if let Some(f) = filter {
            args.push(f.to_string());
        }
        return Some(Runner {
            framework: "cargo",
            program: "cargo",
            args,
        });
    }
    if root.join("package.json").exists() {
        return Some(Runner {
            framework: "npm",
            program: "npm",
            args: vec!["test".to_string(), "--silent".to_string()],
        });
    }
    if root.join("pyproject.toml").exists() || root.join("pytest.ini").exists() {
        let mut args = vec!["-q".to_string()];
        if let Some(f) = filter {
            args.push("-k".to_string());
            args.push(f.to_string());
        }
        return Some(Runner {
            framework: "pytest",
            program: "pytest",
            args,
        });
    }
    None
}

#[async_trait::async_trait]
impl Tool for TestingTool {
    fn name(&self) -> &str {
        "testing"
    }

    fn category(&self) -> &str {
        "testing"
    }

    fn description(&self) -> &str {
        "Detect the project's test framework from its manifest and run the suite. \
         Supports cargo, npm, and pytest projects."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::optional("filter", ParamType::String, "Run only tests matching this name"),
            ToolParameter::optional("path", ParamType::String, "Project subdirectory to test"),
        ]
    }

    fn examples(&self) -> Vec<String> {
        vec![r#"{"filter": "parser"}"#.to_string()]
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult {
        let root = match params["path"].as_str() {
            Some(p) => match ctx.resolve(p) {
                Ok(resolved) => resolved,
                Err(e) => return ToolResult::fail(e.to_string()),
            },
            None => ctx.working_directory.clone(),
        };
        let filter = params["filter"].as_str();

        let runner = match detect_runner(&root, filter) {
            Some(r) => r,
            None => {
                return ToolResult::fail(format!(
                    "no recognized test framework under {}",
                    root.display()
                ))
            }
        };

        debug!("testing: {} {:?}", runner.program, runner.args);
        let started = Instant::now();
        let output = match tokio::time::timeout(
            ctx.timeout,
            Command::new(runner.program)
                .args(&runner.args)
                .current_dir(&root)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::fail(format!("failed to spawn {}: {}", runner.program, e)),
            Err(_) => {
                return ToolResult::fail(format!(
                    "test run timed out after {}ms",
                    ctx.timeout.as_millis()
                ))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let passed = output.status.success();
        let data = json!({
            "framework": runner.framework,
            "passed": passed,
            "exitCode": output.status.code().unwrap_or(-1),
            "executionTime": started.elapsed().as_millis() as u64,
            "stdout": tail(&stdout, 8_000),
            "stderr": tail(&stderr, 4_000),
        });

        if passed {
            ToolResult::ok(data)
        } else {
            let mut result = ToolResult::fail("test suite failed");
            result.data = Some(data);
            result
        }
    }
}

/// Last `max` bytes; test output matters most at the end.
fn tail(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let start = text.len() - max;
    // align on a char boundary
    let start = (start..text.len())
        .find(|i| text.is_char_boundary(*i))
        .unwrap_or(start);
    format!("… {}", &text[start..])
}
