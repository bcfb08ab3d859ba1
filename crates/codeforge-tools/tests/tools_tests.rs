//! Tests for codeforge-tools: registry, safety, and the builtin tools

use codeforge_tools::registry::validate_params;
use codeforge_tools::*;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

struct DummyTool {
    name: &'static str,
    description: &'static str,
}

#[async_trait::async_trait]
impl Tool for DummyTool {
    fn name(&self) -> &str {
        self.name
    }
    fn category(&self) -> &str {
        "dummy"
    }
    fn description(&self) -> &str {
        self.description
    }
    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("target", ParamType::String, "thing to operate on"),
            ToolParameter::optional("count", ParamType::Integer, "how many times")
                .with_default(json!(1))
                .with_validator(|v| {
                    if v.as_i64().unwrap_or(0) > 0 {
                        Ok(())
                    } else {
                        Err("must be positive".to_string())
                    }
                }),
        ]
    }
    async fn execute(&self, params: serde_json::Value, _ctx: &ExecutionContext) -> ToolResult {
        ToolResult::ok(params)
    }
}

fn dummy(name: &'static str, description: &'static str) -> Arc<dyn Tool> {
    Arc::new(DummyTool { name, description })
}

// ===========================================================================
// Registry
// ===========================================================================

#[test]
fn register_unregister_get_round_trip() {
    let registry = ToolRegistry::new();
    registry.register(dummy("alpha", "does alpha things")).unwrap();
    assert!(registry.get("alpha").is_some());
    assert!(registry.unregister("alpha"));
    assert!(registry.get("alpha").is_none());
    assert!(!registry.unregister("alpha"));
}

#[test]
fn register_rejects_empty_metadata() {
    let registry = ToolRegistry::new();
    assert!(registry.register(dummy("", "described")).is_err());
    assert!(registry.register(dummy("named", "")).is_err());
}

#[test]
fn reregistration_overwrites() {
    let registry = ToolRegistry::new();
    registry.register(dummy("tool", "first version")).unwrap();
    registry.register(dummy("tool", "second version")).unwrap();
    assert_eq!(
        registry.get("tool").unwrap().description(),
        "second version"
    );
    assert_eq!(registry.list().len(), 1);
}

#[test]
fn search_ranks_name_over_description() {
    let registry = ToolRegistry::new();
    registry
        .register(dummy("grep", "search file contents"))
        .unwrap();
    registry
        .register(dummy("index", "maintains the grep database"))
        .unwrap();

    let results = registry.search("grep");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].name(), "grep");
    assert_eq!(results[1].name(), "index");
}

#[test]
fn search_matches_parameter_metadata() {
    let registry = ToolRegistry::new();
    registry.register(dummy("runner", "runs things")).unwrap();
    // "target" only appears in the parameter schema
    let results = registry.search("target");
    assert_eq!(results.len(), 1);
}

#[test]
fn by_category_filters() {
    let registry = ToolRegistry::new();
    registry.register(dummy("a", "a tool")).unwrap();
    assert_eq!(registry.by_category("dummy").len(), 1);
    assert!(registry.by_category("other").is_empty());
}

// ===========================================================================
// Parameter validation
// ===========================================================================

#[test]
fn validation_requires_required_params() {
    let tool = DummyTool {
        name: "t",
        description: "d",
    };
    let err = validate_params(&tool, &json!({})).unwrap_err();
    assert!(err.to_string().contains("target"));
}

#[test]
fn validation_applies_defaults() {
    let tool = DummyTool {
        name: "t",
        description: "d",
    };
    let effective = validate_params(&tool, &json!({"target": "x"})).unwrap();
    assert_eq!(effective["count"], 1);
}

#[test]
fn validation_runs_custom_validators() {
    let tool = DummyTool {
        name: "t",
        description: "d",
    };
    let err = validate_params(&tool, &json!({"target": "x", "count": -3})).unwrap_err();
    assert!(err.to_string().contains("must be positive"));
}

#[test]
fn validation_checks_types() {
    let tool = DummyTool {
        name: "t",
        description: "d",
    };
    assert!(validate_params(&tool, &json!({"target": 42})).is_err());
}

// ===========================================================================
// Path safety
// ===========================================================================

#[test]
fn resolve_rejects_traversal() {
    let dir = TempDir::new().unwrap();
    let ctx = ExecutionContext::new(dir.path());
    assert!(ctx.resolve("inside.txt").is_ok());
    assert!(ctx.resolve("../outside.txt").is_err());
    assert!(ctx.resolve("/etc/passwd").is_err());
    assert!(ctx.resolve("a/../../escape").is_err());
}

#[test]
fn resolve_keeps_nested_paths_inside() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("src/deep")).unwrap();
    let ctx = ExecutionContext::new(dir.path());
    let resolved = ctx.resolve("src/deep/../deep/file.rs").unwrap();
    assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
}

#[test]
fn working_directory_must_be_under_root() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("sub")).unwrap();
    assert!(ExecutionContext::new(dir.path())
        .with_working_directory(dir.path().join("sub"))
        .is_ok());
    assert!(ExecutionContext::new(dir.path())
        .with_working_directory("/tmp")
        .is_err());
}

// ===========================================================================
// Filesystem tool
// ===========================================================================

#[tokio::test]
async fn filesystem_write_read_round_trip() {
    let dir = TempDir::new().unwrap();
    let ctx = ExecutionContext::new(dir.path());
    let tool = tools::filesystem::FileSystemTool::new();

    let write = tool
        .execute(
            json!({"operation": "write", "path": "notes/a.txt", "content": "hello\n"}),
            &ctx,
        )
        .await;
    assert!(write.success, "{:?}", write.error);

    let read = tool
        .execute(json!({"operation": "read", "path": "notes/a.txt"}), &ctx)
        .await;
    assert!(read.success);
    assert_eq!(read.data.unwrap()["content"], "hello\n");
}

#[tokio::test]
async fn filesystem_rejects_escaping_paths() {
    let dir = TempDir::new().unwrap();
    let ctx = ExecutionContext::new(dir.path());
    let tool = tools::filesystem::FileSystemTool::new();

    let result = tool
        .execute(
            json!({"operation": "write", "path": "../evil.txt", "content": "x"}),
            &ctx,
        )
        .await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("escapes project root"));
}

#[tokio::test]
async fn filesystem_exists_delete_list() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), "x").unwrap();
    let ctx = ExecutionContext::new(dir.path());
    let tool = tools::filesystem::FileSystemTool::new();

    let exists = tool
        .execute(json!({"operation": "exists", "path": "a.txt"}), &ctx)
        .await;
    assert_eq!(exists.data.unwrap()["exists"], true);

    let list = tool
        .execute(json!({"operation": "list", "path": "."}), &ctx)
        .await;
    assert!(list.success);
    assert_eq!(list.data.unwrap()["count"], 1);

    let delete = tool
        .execute(json!({"operation": "delete", "path": "a.txt"}), &ctx)
        .await;
    assert!(delete.success);
    assert!(!dir.path().join("a.txt").exists());
}

#[tokio::test]
async fn filesystem_read_refuses_binary() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("blob.bin"), [0u8, 159, 146, 150]).unwrap();
    let ctx = ExecutionContext::new(dir.path());
    let tool = tools::filesystem::FileSystemTool::new();

    let read = tool
        .execute(json!({"operation": "read", "path": "blob.bin"}), &ctx)
        .await;
    assert!(!read.success);
    assert!(read.error.unwrap().contains("binary"));
}

// ===========================================================================
// Search tool
// ===========================================================================

fn search_fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(
        dir.path().join("src/lib.rs"),
        "pub fn alpha() {}\n// TODO: beta\npub fn gamma() {}\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("src/todo_list.md"), "nothing here\n").unwrap();
    dir
}

#[tokio::test]
async fn search_content_matches_are_real() {
    let dir = search_fixture();
    let ctx = ExecutionContext::new(dir.path());
    let tool = tools::search::SearchTool::new();

    let result = tool
        .execute(json!({"query": "TODO", "type": "content"}), &ctx)
        .await;
    assert!(result.success);
    let data = result.data.unwrap();
    let matches = data["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    let m = &matches[0];
    assert_eq!(m["file"], "src/lib.rs");
    assert_eq!(m["line"], 2);
    // every returned match must actually contain the query
    assert!(m["content"].as_str().unwrap().contains("TODO"));
}

#[tokio::test]
async fn search_filename_mode() {
    let dir = search_fixture();
    let ctx = ExecutionContext::new(dir.path());
    let tool = tools::search::SearchTool::new();

    let result = tool
        .execute(json!({"query": "todo", "type": "filename"}), &ctx)
        .await;
    let data = result.data.unwrap();
    let matches = data["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["file"], "src/todo_list.md");
}

#[tokio::test]
async fn search_escapes_literal_queries() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), "price is $5 (sale)\nno match\n").unwrap();
    let ctx = ExecutionContext::new(dir.path());
    let tool = tools::search::SearchTool::new();

    // "$5 (sale)" is regex-hostile unless escaped
    let result = tool
        .execute(json!({"query": "$5 (sale)"}), &ctx)
        .await;
    assert!(result.success);
    assert_eq!(result.data.unwrap()["total"], 1);
}

#[tokio::test]
async fn search_honors_max_results_and_context() {
    let dir = TempDir::new().unwrap();
    let body: String = (0..20).map(|i| format!("hit {}\n", i)).collect();
    std::fs::write(dir.path().join("hits.txt"), body).unwrap();
    let ctx = ExecutionContext::new(dir.path());
    let tool = tools::search::SearchTool::new();

    let result = tool
        .execute(
            json!({"query": "hit", "maxResults": 5, "contextLines": 1}),
            &ctx,
        )
        .await;
    let data = result.data.unwrap();
    assert_eq!(data["total"], 5);
    assert_eq!(data["truncated"], true);
    let second = &data["matches"][1];
    assert_eq!(second["context"]["before"].as_array().unwrap().len(), 1);
    assert_eq!(second["context"]["after"].as_array().unwrap().len(), 1);
}

// ===========================================================================
// Execute tool
// ===========================================================================

#[tokio::test]
async fn execute_denylist_rejects_without_spawning() {
    let dir = TempDir::new().unwrap();
    let ctx = ExecutionContext::new(dir.path());
    let tool = tools::execute::ExecuteTool::new();

    let result = tool
        .execute(json!({"command": "rm", "args": ["-rf", "/"]}), &ctx)
        .await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("not allowed"));
    assert!(result.data.is_none(), "no process output may exist");
}

#[tokio::test]
async fn execute_allowlist_overrides_denylist() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("victim.txt"), "x").unwrap();
    let ctx = ExecutionContext::new(dir.path());
    let tool = tools::execute::ExecuteTool::new();

    let result = tool
        .execute(
            json!({
                "command": "rm",
                "args": [dir.path().join("victim.txt").display().to_string()],
                "allowedCommands": ["rm"]
            }),
            &ctx,
        )
        .await;
    assert!(result.success, "{:?}", result.error);
    assert!(!dir.path().join("victim.txt").exists());
}

#[tokio::test]
async fn execute_captures_output_and_exit_code() {
    let dir = TempDir::new().unwrap();
    let ctx = ExecutionContext::new(dir.path());
    let tool = tools::execute::ExecuteTool::new();

    let result = tool
        .execute(json!({"command": "echo", "args": ["hello world"]}), &ctx)
        .await;
    assert!(result.success);
    let data = result.data.unwrap();
    assert_eq!(data["exitCode"], 0);
    assert!(data["stdout"].as_str().unwrap().contains("hello world"));
    assert_eq!(data["timedOut"], false);
}

#[tokio::test]
async fn execute_nonzero_exit_is_failure() {
    let dir = TempDir::new().unwrap();
    let ctx = ExecutionContext::new(dir.path());
    let tool = tools::execute::ExecuteTool::new();

    let result = tool
        .execute(json!({"command": "false"}), &ctx)
        .await;
    assert!(!result.success);
    assert_eq!(result.data.unwrap()["exitCode"], 1);
}

#[tokio::test]
async fn execute_times_out() {
    let dir = TempDir::new().unwrap();
    let ctx = ExecutionContext::new(dir.path());
    let tool = tools::execute::ExecuteTool::new();

    let result = tool
        .execute(
            json!({"command": "sleep", "args": ["5"], "timeout": 1}),
            &ctx,
        )
        .await;
    assert!(!result.success);
    assert_eq!(result.data.unwrap()["timedOut"], true);
}

// ===========================================================================
// Default registry
// ===========================================================================

#[test]
fn default_registry_has_all_builtins() {
    let registry = create_default_registry().unwrap();
    for name in ["filesystem", "search", "execute", "git", "code_analysis", "testing"] {
        assert!(registry.get(name).is_some(), "missing tool {}", name);
    }
}

#[tokio::test]
async fn git_tool_unknown_operation_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let ctx = ExecutionContext::new(dir.path());
    let tool = tools::git::GitTool::new();
    let result = tool
        .execute(json!({"operation": "push"}), &ctx)
        .await;
    assert!(!result.success);
}

#[tokio::test]
async fn analyze_reports_structure() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("sample.rs"),
        "fn one() {\n    if true { }\n}\n\nfn two() { }\n// TODO tidy\n",
    )
    .unwrap();
    let ctx = ExecutionContext::new(dir.path());
    let tool = tools::analyze::CodeAnalysisTool::new();

    let result = tool.execute(json!({"path": "."}), &ctx).await;
    assert!(result.success);
    let data = result.data.unwrap();
    assert_eq!(data["files"], 1);
    assert_eq!(data["functions"], 2);
    assert!(data["findings"]
        .as_array()
        .unwrap()
        .iter()
        .any(|f| f["kind"] == "marker"));
}
