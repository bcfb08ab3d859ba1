//! Prompt templates for intent refinement, plan generation, and task
//! execution. Placeholders are `{name}` and filled with `str::replace`.

pub const INTENT_PROMPT: &str = r#"You classify requests made to a coding assistant.

Analyze the user message and answer with a single JSON object, nothing else:
{
  "type": "task_request" | "question" | "command" | "conversation" | "clarification",
  "action": "<normalized verb phrase>",
  "entities": {
    "files": [], "directories": [], "functions": [], "classes": [],
    "technologies": [], "concepts": [], "variables": []
  },
  "confidence": <0.0-1.0>,
  "complexity": "simple" | "moderate" | "complex" | "expert",
  "multiStep": <bool>,
  "riskLevel": "low" | "medium" | "high",
  "requiresClarification": <bool>,
  "suggestedQuestions": [],
  "estimatedDuration": <minutes>
}

Project context:
{context}

User message:
{input}
"#;

pub const PLAN_PROMPT: &str = r#"You are the planning component of a coding assistant. Break the request into
concrete tasks and answer with a single JSON object, nothing else:
{
  "title": string,
  "description": string,
  "tasks": [
    {
      "title": string,
      "description": string,
      "type": "analysis" | "implementation" | "testing" | "documentation" | "refactoring",
      "priority": "low" | "medium" | "high" | "critical",
      "dependencies": [<titles of earlier tasks>],
      "estimatedDuration": <minutes, between 15 and 60>,
      "toolsRequired": [<tool names from the list below>],
      "filesInvolved": [<paths>],
      "acceptance_criteria": [string]
    }
  ]
}

Rules:
- every task takes 15 to 60 minutes; split anything larger
- dependencies reference earlier task titles only; no cycles
- overall complexity is {complexity}; keep the task count proportionate

Available tools: {tools}
Project languages: {languages}

Request ({action}):
{input}
"#;

pub const TASK_PROMPT: &str = r#"You are executing one task of a larger plan for a coding assistant.

Task: {title}
Description: {description}

Results of completed dependencies:
{dependency_results}

Acceptance criteria:
{acceptance_criteria}

Tools granted for this task: {tools}

Produce the work product for this task as plain text. Be concrete and
complete; do not restate the task.
"#;

/// The first top-level JSON object embedded in `text`, if any. Models often
/// wrap JSON in prose or code fences; this digs it out.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
