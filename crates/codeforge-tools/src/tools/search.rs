//! Search tool — combined filename and content search with context lines

use crate::context::ExecutionContext;
use crate::registry::{ParamType, Tool, ToolParameter, ToolResult};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use regex::RegexBuilder;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Serialize)]
struct Match {
    file: String,
    line: usize,
    column: usize,
    content: String,
    context: MatchContext,
}

#[derive(Serialize, Default)]
struct MatchContext {
    before: Vec<String>,
    after: Vec<String>,
}

pub struct SearchTool;

impl SearchTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn category(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search file contents and file names. Supports regex or literal queries, \
         glob filtering, context lines, and gitignore-aware walking."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("query", ParamType::String, "Text or regex to search for"),
            ToolParameter::optional("path", ParamType::String, "Directory to search (default: working directory)"),
            ToolParameter::optional("type", ParamType::String, "content, filename, or both")
                .with_default(json!("content"))
                .with_validator(|v| match v.as_str() {
                    Some("content" | "filename" | "both") => Ok(()),
                    _ => Err("must be content, filename, or both".to_string()),
                }),
            ToolParameter::optional("filePattern", ParamType::String, "Glob filter, e.g. '*.rs'"),
            ToolParameter::optional("caseSensitive", ParamType::Boolean, "Case sensitive match")
                .with_default(json!(false)),
            ToolParameter::optional("useRegex", ParamType::Boolean, "Treat the query as a regex")
                .with_default(json!(false)),
            ToolParameter::optional("contextLines", ParamType::Integer, "Lines of context around content matches")
                .with_default(json!(0)),
            ToolParameter::optional("maxResults", ParamType::Integer, "Result cap")
                .with_default(json!(100)),
            ToolParameter::optional("excludePatterns", ParamType::Array, "Glob patterns to skip"),
            ToolParameter::optional("respectGitIgnore", ParamType::Boolean, "Honor .gitignore files")
                .with_default(json!(true)),
        ]
    }

    fn examples(&self) -> Vec<String> {
        vec![
            r#"{"query": "TODO", "filePattern": "*.rs"}"#.to_string(),
            r#"{"query": "fn \\w+", "useRegex": true, "contextLines": 2}"#.to_string(),
        ]
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult {
        let query = params["query"].as_str().unwrap_or_default();
        let search_type = params["type"].as_str().unwrap_or("content");
        let case_sensitive = params["caseSensitive"].as_bool().unwrap_or(false);
        let use_regex = params["useRegex"].as_bool().unwrap_or(false);
        let context_lines = params["contextLines"].as_u64().unwrap_or(0) as usize;
        let max_results = params["maxResults"].as_u64().unwrap_or(100) as usize;
        let respect_gitignore = params["respectGitIgnore"].as_bool().unwrap_or(true);

        let root = match params["path"].as_str() {
            Some(p) => match ctx.resolve(p) {
                Ok(resolved) => resolved,
                Err(e) => return ToolResult::fail(e.to_string()),
            },
            None => ctx.working_directory.clone(),
        };

        // Literal queries must be escaped before compilation
        let pattern = if use_regex {
            query.to_string()
        } else {
            regex::escape(query)
        };
        let regex = match RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
        {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("invalid regex: {}", e)),
        };

        let file_glob = match params["filePattern"].as_str() {
            Some(g) => match Glob::new(g) {
                Ok(glob) => Some(glob.compile_matcher()),
                Err(e) => return ToolResult::fail(format!("invalid file pattern: {}", e)),
            },
            None => None,
        };

        let excludes = match build_excludes(&params["excludePatterns"]) {
            Ok(set) => set,
            Err(e) => return ToolResult::fail(e),
        };

        let mut matches: Vec<Match> = Vec::new();
        let mut truncated = false;

        let walker = WalkBuilder::new(&root)
            .git_ignore(respect_gitignore)
            .git_global(respect_gitignore)
            .git_exclude(respect_gitignore)
            .build();

        'files: for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("search: skipping entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            let relative = path
                .strip_prefix(&root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            if excludes.is_match(&relative) {
                continue;
            }
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if let Some(glob) = &file_glob {
                if !glob.is_match(&file_name) && !glob.is_match(&relative) {
                    continue;
                }
            }

            if search_type == "filename" || search_type == "both" {
                if let Some(found) = regex.find(&file_name) {
                    matches.push(Match {
                        file: relative.clone(),
                        line: 0,
                        column: found.start() + 1,
                        content: file_name.clone(),
                        context: MatchContext::default(),
                    });
                    if matches.len() >= max_results {
                        truncated = true;
                        break 'files;
                    }
                }
            }

            if search_type == "content" || search_type == "both" {
                // Binary and unreadable files are silently skipped
                let bytes = match std::fs::read(path) {
                    Ok(b) => b,
                    Err(e) => {
                        debug!("search: cannot read {}: {}", relative, e);
                        continue;
                    }
                };
                if super::filesystem::is_binary(&bytes) {
                    debug!("search: skipping binary {}", relative);
                    continue;
                }
                let content = String::from_utf8_lossy(&bytes);
                let lines: Vec<&str> = content.lines().collect();
                for (i, line) in lines.iter().enumerate() {
                    if let Some(found) = regex.find(line) {
                        let before = lines[i.saturating_sub(context_lines)..i]
                            .iter()
                            .map(|l| l.to_string())
                            .collect();
                        let after = lines[(i + 1).min(lines.len())
                            ..(i + 1 + context_lines).min(lines.len())]
                            .iter()
                            .map(|l| l.to_string())
                            .collect();
                        matches.push(Match {
                            file: relative.clone(),
                            line: i + 1,
                            column: found.start() + 1,
                            content: line.to_string(),
                            context: MatchContext { before, after },
                        });
                        if matches.len() >= max_results {
                            truncated = true;
                            break 'files;
                        }
                    }
                }
            }
        }

        debug!("search: '{}' → {} matches", query, matches.len());
        ToolResult::ok(json!({
            "matches": matches,
            "total": matches.len(),
            "truncated": truncated,
        }))
    }
}

fn build_excludes(patterns: &Value) -> Result<GlobSet, String> {
    let mut builder = GlobSetBuilder::new();
    if let Some(items) = patterns.as_array() {
        for item in items {
            if let Some(pattern) = item.as_str() {
                builder.add(Glob::new(pattern).map_err(|e| format!("invalid exclude: {}", e))?);
            }
        }
    }
    builder.build().map_err(|e| e.to_string())
}
