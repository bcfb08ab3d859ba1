//! Pre-write content validation, dispatched on file extension
//!
//! SYNTAX checks are cheap structural scans; SEMANTIC adds import checks
//! against the project index. The LLM-backed levels are optional and never
//! gate a write when disabled.

use codeforge_context::ProjectContext;
use regex::Regex;
use std::path::Path;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationLevel {
    #[default]
    Syntax,
    Semantic,
    FullProject,
    AiEnhanced,
}

/// Validate content for the given path. Returns human-readable problems;
/// empty means the content passed.
pub fn validate_syntax(path: &Path, content: &str) -> Vec<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();
    match ext.as_str() {
        "json" => validate_json(content),
        "js" | "jsx" | "ts" | "tsx" => validate_braces(content),
        "py" => validate_python_indentation(content),
        "md" => validate_markdown(content),
        _ => validate_generic(content),
    }
}

fn validate_json(content: &str) -> Vec<String> {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(_) => Vec::new(),
        Err(e) => vec![format!("invalid JSON: {}", e)],
    }
}

/// Balanced (), {}, [] outside of strings, template literals, and comments.
fn validate_braces(content: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut in_string: Option<char> = None;
    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut escaped = false;
    let mut line = 1usize;
    let mut prev = '\0';

    for c in content.chars() {
        if c == '\n' {
            line += 1;
            in_line_comment = false;
            if in_string == Some('"') || in_string == Some('\'') {
                // plain strings cannot span lines
                in_string = None;
            }
            prev = c;
            escaped = false;
            continue;
        }
        if in_line_comment {
            prev = c;
            continue;
        }
        if in_block_comment {
            if prev == '*' && c == '/' {
                in_block_comment = false;
            }
            prev = c;
            continue;
        }
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            prev = c;
            continue;
        }
        match c {
            '"' | '\'' | '`' => in_string = Some(c),
            '/' if prev == '/' => in_line_comment = true,
            '*' if prev == '/' => in_block_comment = true,
            '(' | '{' | '[' => stack.push((c, line)),
            ')' | '}' | ']' => {
                let expected = match c {
                    ')' => '(',
                    '}' => '{',
                    _ => '[',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, open_line)) => errors.push(format!(
                        "line {}: '{}' closes '{}' opened on line {}",
                        line, c, open, open_line
                    )),
                    None => errors.push(format!("line {}: unmatched '{}'", line, c)),
                }
            }
            _ => {}
        }
        prev = c;
    }

    if in_string == Some('`') {
        errors.push("unterminated template literal".to_string());
    }
    for (open, open_line) in stack {
        errors.push(format!("line {}: '{}' is never closed", open_line, open));
    }
    errors
}

/// Tabs-vs-spaces mixing and indent units that don't divide evenly.
fn validate_python_indentation(content: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let mut uses_spaces = false;
    let mut uses_tabs = false;
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let indent: String = line.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
        if indent.contains(' ') && indent.contains('\t') {
            errors.push(format!("line {}: mixed tabs and spaces", i + 1));
        }
        if indent.contains(' ') {
            uses_spaces = true;
            let width = indent.chars().filter(|c| *c == ' ').count();
            if width % 4 != 0 && width % 2 != 0 {
                errors.push(format!("line {}: odd indentation width {}", i + 1, width));
            }
        }
        if indent.contains('\t') {
            uses_tabs = true;
        }
    }
    if uses_spaces && uses_tabs {
        errors.push("file mixes tab and space indentation".to_string());
    }
    errors
}

/// ATX headings must have a space after the hashes and not skip from # to ###+.
fn validate_markdown(content: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let mut last_level = 0usize;
    for (i, line) in content.lines().enumerate() {
        if !line.starts_with('#') {
            continue;
        }
        let level = line.chars().take_while(|c| *c == '#').count();
        let rest = &line[level..];
        if !rest.is_empty() && !rest.starts_with(' ') {
            errors.push(format!("line {}: heading needs a space after '#'", i + 1));
        }
        if last_level > 0 && level > last_level + 1 {
            errors.push(format!(
                "line {}: heading level jumps from {} to {}",
                i + 1,
                last_level,
                level
            ));
        }
        last_level = level;
    }
    errors
}

/// Fallback for unknown extensions: printable content and sane line lengths.
fn validate_generic(content: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if content.contains('\0') {
        errors.push("content contains NUL bytes".to_string());
    }
    for (i, line) in content.lines().enumerate() {
        if line.len() > 10_000 {
            errors.push(format!("line {}: longer than 10000 characters", i + 1));
            break;
        }
    }
    errors
}

/// SEMANTIC level: relative imports must point at files the project index
/// knows about. Absolute and package imports are out of scope here.
pub async fn validate_semantic(
    path: &Path,
    content: &str,
    project: &ProjectContext,
) -> Vec<String> {
    let import_pattern =
        Regex::new(r#"(?:from|import|require\()\s*['"](\.{1,2}/[^'"]+)['"]"#).expect("static regex");
    let mut errors = Vec::new();

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    for capture in import_pattern.captures_iter(content) {
        let target = &capture[1];
        let joined = parent.join(target);
        let normalized = normalize(&joined);
        let mut found = project.contains(&normalized).await;
        if !found {
            // extensionless imports resolve against the usual suffixes
            for suffix in [".ts", ".tsx", ".js", ".jsx", "/index.ts", "/index.js"] {
                if project.contains(&format!("{}{}", normalized, suffix)).await {
                    found = true;
                    break;
                }
            }
        }
        if !found {
            errors.push(format!("import target not in project: {}", target));
        }
    }
    errors
}

fn normalize(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                parts.pop();
            }
            std::path::Component::CurDir => {}
            other => parts.push(other.as_os_str().to_string_lossy().to_string()),
        }
    }
    parts.join("/")
}
