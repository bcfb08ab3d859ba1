//! Execute tool — run child processes with a command denylist, timeout
//! escalation, and cancellation
//!
//! Denylisted basenames are rejected before any process is spawned unless
//! the caller supplies an explicit allowlist containing them. Timeouts send
//! SIGTERM first and escalate to SIGKILL after a 5 second grace period;
//! cancellation follows the same path.

use crate::context::ExecutionContext;
use crate::registry::{ParamType, Tool, ToolParameter, ToolResult};
use crate::safety;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::debug;

const KILL_GRACE: Duration = Duration::from_secs(5);
const MAX_CAPTURED_OUTPUT: usize = 30_000;

pub struct ExecuteTool;

impl ExecuteTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ExecuteTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for ExecuteTool {
    fn name(&self) -> &str {
        "execute"
    }

    fn category(&self) -> &str {
        "execution"
    }

    fn description(&self) -> &str {
        "Run a command as a child process. Dangerous commands are rejected unless \
         explicitly allowlisted. Captures stdout and stderr; success means exit code 0."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("command", ParamType::String, "Command to run"),
            ToolParameter::optional("args", ParamType::Array, "Arguments for the command"),
            ToolParameter::optional("cwd", ParamType::String, "Working directory (inside the project root)"),
            ToolParameter::optional("timeout", ParamType::Integer, "Timeout in seconds (default: context timeout)"),
            ToolParameter::optional("env", ParamType::Object, "Extra environment variables"),
            ToolParameter::optional("shell", ParamType::Boolean, "Run through /bin/sh -c")
                .with_default(json!(false)),
            ToolParameter::optional("captureOutput", ParamType::Boolean, "Capture stdout/stderr")
                .with_default(json!(true)),
            ToolParameter::optional("allowedCommands", ParamType::Array, "Explicit allowlist overriding the denylist"),
        ]
    }

    fn examples(&self) -> Vec<String> {
        vec![
            r#"{"command": "cargo", "args": ["check"]}"#.to_string(),
            r#"{"command": "git", "args": ["status", "--short"]}"#.to_string(),
        ]
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult {
        self.execute_cancellable(params, ctx).await
    }

    /// The real implementation lives here so the child can be killed on
    /// cancellation instead of racing a detached future.
    async fn execute_cancellable(&self, params: Value, ctx: &ExecutionContext) -> ToolResult {
        let command = params["command"].as_str().unwrap_or_default();
        let args: Vec<String> = params["args"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        let allowlist: Option<Vec<String>> = params["allowedCommands"].as_array().map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        });

        // Safety gate before anything is spawned
        if let Err(e) = safety::command_allowed(command, allowlist.as_deref()) {
            return ToolResult::fail(e.to_string());
        }

        let cwd = match params["cwd"].as_str() {
            Some(dir) => match ctx.resolve(dir) {
                Ok(resolved) => resolved,
                Err(e) => return ToolResult::fail(e.to_string()),
            },
            None => ctx.working_directory.clone(),
        };

        let timeout = params["timeout"]
            .as_u64()
            .map(Duration::from_secs)
            .unwrap_or(ctx.timeout);
        let capture = params["captureOutput"].as_bool().unwrap_or(true);
        let shell = params["shell"].as_bool().unwrap_or(false);

        let mut cmd = if shell {
            let mut line = command.to_string();
            for arg in &args {
                line.push(' ');
                line.push_str(arg);
            }
            let mut c = Command::new("/bin/sh");
            c.arg("-c").arg(line);
            c
        } else {
            let mut c = Command::new(command);
            c.args(&args);
            c
        };
        cmd.current_dir(&cwd).kill_on_drop(true);
        for (key, value) in &ctx.environment {
            cmd.env(key, value);
        }
        if let Some(env) = params["env"].as_object() {
            for (key, value) in env {
                if let Some(v) = value.as_str() {
                    cmd.env(key, v);
                }
            }
        }
        if capture {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        debug!("execute: {} {:?}", command, args);
        let started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return ToolResult::fail(format!("failed to spawn: {}", e)),
        };

        let mut timed_out = false;
        let status = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                terminate_then_kill(&mut child).await;
                return ToolResult::cancelled();
            }
            result = tokio::time::timeout(timeout, child.wait()) => match result {
                Ok(Ok(status)) => Some(status),
                Ok(Err(e)) => return ToolResult::fail(format!("failed to wait: {}", e)),
                Err(_) => {
                    timed_out = true;
                    terminate_then_kill(&mut child).await;
                    None
                }
            },
        };

        let stdout = read_pipe(child.stdout.take()).await;
        let stderr = read_pipe(child.stderr.take()).await;
        let exit_code = status.and_then(|s| s.code()).unwrap_or(-1);
        let execution_time = started.elapsed().as_millis() as u64;

        let data = json!({
            "command": command,
            "exitCode": exit_code,
            "stdout": truncate(stdout),
            "stderr": truncate(stderr),
            "executionTime": execution_time,
            "timedOut": timed_out,
        });

        if timed_out {
            let mut result =
                ToolResult::fail(format!("timed out after {}ms", timeout.as_millis()));
            result.data = Some(data);
            result
        } else if exit_code == 0 {
            ToolResult::ok(data)
        } else {
            let mut result = ToolResult::fail(format!("exit code {}", exit_code));
            result.data = Some(data);
            result
        }
    }
}

/// SIGTERM, wait up to the grace period, then SIGKILL.
async fn terminate_then_kill(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
                return;
            }
        }
    }
    let _ = child.kill().await;
}

async fn read_pipe(pipe: Option<impl tokio::io::AsyncRead + Unpin>) -> String {
    match pipe {
        Some(mut p) => {
            let mut buf = Vec::new();
            let _ = p.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).to_string()
        }
        None => String::new(),
    }
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_CAPTURED_OUTPUT {
        let total = text.len();
        text.truncate(MAX_CAPTURED_OUTPUT);
        text.push_str(&format!("\n… [truncated, {} total chars]", total));
    }
    text
}
