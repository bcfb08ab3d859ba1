//! Code analysis tool — heuristic structure and complexity findings
//!
//! The heuristics are keyword tables, not parsers: branch-keyword density
//! approximates cyclomatic complexity and simple thresholds flag long
//! functions and lines. Findings are hints, never proofs.

use crate::context::ExecutionContext;
use crate::registry::{ParamType, Tool, ToolParameter, ToolResult};
use regex::Regex;
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

const BRANCH_KEYWORDS: &[&str] = &[
    "if ", "else ", "for ", "while ", "match ", "case ", "catch ", "&&", "||", "?",
];
const LONG_FUNCTION_LINES: usize = 50;
const LONG_LINE_CHARS: usize = 120;
const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "py", "go", "java", "c", "cpp", "h", "rb",
];

pub struct CodeAnalysisTool {
    function_pattern: Regex,
}

impl CodeAnalysisTool {
    pub fn new() -> Self {
        // fn/function/def headers across the supported languages
        let function_pattern =
            Regex::new(r"^\s*(pub\s+)?(async\s+)?(fn|function|def)\s+[A-Za-z_][A-Za-z0-9_]*")
                .expect("static regex");
        Self { function_pattern }
    }
}

impl Default for CodeAnalysisTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for CodeAnalysisTool {
    fn name(&self) -> &str {
        "code_analysis"
    }

    fn category(&self) -> &str {
        "analysis"
    }

    fn description(&self) -> &str {
        "Heuristic code analysis: line counts, function counts, complexity estimates, \
         and findings for long functions, long lines, and TODO markers."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("path", ParamType::String, "File or directory to analyze"),
            ToolParameter::optional("maxFindings", ParamType::Integer, "Cap on reported findings")
                .with_default(json!(50)),
        ]
    }

    fn examples(&self) -> Vec<String> {
        vec![r#"{"path": "src"}"#.to_string()]
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult {
        let raw_path = params["path"].as_str().unwrap_or_default();
        let max_findings = params["maxFindings"].as_u64().unwrap_or(50) as usize;

        let root = match ctx.resolve(raw_path) {
            Ok(p) => p,
            Err(e) => return ToolResult::fail(e.to_string()),
        };

        let mut files = 0usize;
        let mut total_lines = 0usize;
        let mut total_functions = 0usize;
        let mut total_complexity = 0usize;
        let mut findings: Vec<Value> = Vec::new();

        let targets: Vec<std::path::PathBuf> = if root.is_file() {
            vec![root.clone()]
        } else {
            WalkDir::new(&root)
                .into_iter()
                .filter_entry(|e| {
                    let name = e.file_name().to_string_lossy();
                    !name.starts_with('.') && name != "node_modules" && name != "target"
                })
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_source(e.path()))
                .map(|e| e.path().to_path_buf())
                .collect()
        };

        for path in targets {
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    debug!("analyze: cannot read {}: {}", path.display(), e);
                    continue;
                }
            };
            files += 1;
            let display = path.display().to_string();
            let report = analyze_file(&self.function_pattern, &display, &content);
            total_lines += report.lines;
            total_functions += report.functions;
            total_complexity += report.complexity;
            for finding in report.findings {
                if findings.len() < max_findings {
                    findings.push(finding);
                }
            }
        }

        if files == 0 {
            return ToolResult::fail(format!("no source files under {}", raw_path));
        }

        ToolResult::ok(json!({
            "files": files,
            "totalLines": total_lines,
            "functions": total_functions,
            "complexity": total_complexity,
            "averageComplexity": total_complexity as f64 / files as f64,
            "findings": findings,
        }))
    }
}

struct FileReport {
    lines: usize,
    functions: usize,
    complexity: usize,
    findings: Vec<Value>,
}

fn analyze_file(function_pattern: &Regex, path: &str, content: &str) -> FileReport {
    let lines: Vec<&str> = content.lines().collect();
    let mut functions = 0usize;
    let mut complexity = 0usize;
    let mut findings: Vec<Value> = Vec::new();

    let mut current_function_start: Option<usize> = None;
    for (i, line) in lines.iter().enumerate() {
        for keyword in BRANCH_KEYWORDS {
            complexity += line.matches(keyword).count();
        }
        if line.len() > LONG_LINE_CHARS {
            findings.push(json!({
                "kind": "long_line",
                "file": path,
                "line": i + 1,
                "message": format!("line is {} characters", line.len()),
            }));
        }
        if line.contains("TODO") || line.contains("FIXME") {
            findings.push(json!({
                "kind": "marker",
                "file": path,
                "line": i + 1,
                "message": line.trim().to_string(),
            }));
        }
        if function_pattern.is_match(line) {
            if let Some(start) = current_function_start.take() {
                let length = i - start;
                if length > LONG_FUNCTION_LINES {
                    findings.push(json!({
                        "kind": "long_function",
                        "file": path,
                        "line": start + 1,
                        "message": format!("function spans {} lines", length),
                    }));
                }
            }
            functions += 1;
            current_function_start = Some(i);
        }
    }
    if let Some(start) = current_function_start {
        let length = lines.len() - start;
        if length > LONG_FUNCTION_LINES {
            findings.push(json!({
                "kind": "long_function",
                "file": path,
                "line": start + 1,
                "message": format!("function spans {} lines", length),
            }));
        }
    }

    FileReport {
        lines: lines.len(),
        functions,
        complexity,
        findings,
    }
}

fn is_source(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SOURCE_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}
