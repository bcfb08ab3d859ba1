//! Intent analyzer — deterministic prefilter plus LLM refinement
//!
//! The prefilter alone classifies trivial cases from keyword tables and
//! entity regexes. The LLM pass refines it through a constrained JSON
//! prompt; the two are merged keeping the higher-confidence interpretation.
//! When the model's JSON cannot be parsed the prefilter result is used with
//! confidence 0.3 and clarification requested.

use crate::prompts;
use codeforge_core::{
    Complexity, EntitySet, Intent, IntentContext, IntentType, RiskLevel,
};
use codeforge_llm::{ChatMessage, ChatRequest, LlmProvider};
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const HIGH_RISK_VERBS: &[&str] = &["delete", "drop", "migrate", "refactor", "deploy", "remove"];
const MEDIUM_RISK_VERBS: &[&str] = &[
    "create", "modify", "install", "add", "update", "write", "change", "implement", "fix",
    "generate", "rename",
];
const LOW_RISK_VERBS: &[&str] = &[
    "explain", "show", "analyze", "list", "describe", "find", "search", "read", "review",
];

const QUESTION_WORDS: &[&str] = &[
    "what", "why", "how", "where", "when", "which", "who", "is", "are", "can", "does", "do",
];

const COMPLEXITY_KEYWORDS: &[&str] = &[
    "refactor", "migrate", "architecture", "redesign", "entire", "all", "every", "optimize",
    "rewrite", "across",
];

const TECHNOLOGIES: &[&str] = &[
    "rust", "python", "typescript", "javascript", "java", "golang", "react", "node", "tokio",
    "docker", "kubernetes", "sql", "postgres", "redis", "git", "cargo", "npm",
];

/// Context slice handed to the analyzer for one utterance.
#[derive(Clone, Debug, Default)]
pub struct AnalysisContext {
    pub project_summary: Option<String>,
    pub recent_files: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub previous_intent: Option<Intent>,
}

pub struct IntentAnalyzer {
    provider: Arc<dyn LlmProvider>,
}

impl IntentAnalyzer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Two-stage analysis. The prefilter always runs; the LLM refinement is
    /// merged on top when it returns usable JSON.
    pub async fn analyze(
        &self,
        input: &str,
        ctx: &AnalysisContext,
        cancel: Option<CancellationToken>,
    ) -> Intent {
        let prefiltered = Self::prefilter(input, ctx);

        let prompt = prompts::INTENT_PROMPT
            .replace(
                "{context}",
                ctx.project_summary.as_deref().unwrap_or("(none)"),
            )
            .replace("{input}", input);
        let request = ChatRequest::new(self.provider.model())
            .with_message(ChatMessage::user(prompt))
            .json_format();

        let response = match self.provider.complete(request, cancel).await {
            Ok(r) => r,
            Err(e) => {
                debug!("intent refinement unavailable: {}", e);
                return degraded(prefiltered);
            }
        };

        match parse_refinement(response.content()) {
            Some(refined) => merge(prefiltered, refined),
            None => {
                debug!("intent refinement returned unusable JSON");
                degraded(prefiltered)
            }
        }
    }

    /// Deterministic keyword/regex classification. Public so the pipeline is
    /// testable without a model.
    pub fn prefilter(input: &str, ctx: &AnalysisContext) -> Intent {
        let lower = input.to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();

        let entities = extract_entities(input);
        let action = words
            .iter()
            .find(|w| {
                HIGH_RISK_VERBS.contains(*w)
                    || MEDIUM_RISK_VERBS.contains(*w)
                    || LOW_RISK_VERBS.contains(*w)
            })
            .copied()
            .unwrap_or_else(|| words.first().copied().unwrap_or(""))
            .to_string();

        let is_question = lower.trim_end().ends_with('?')
            || words
                .first()
                .map(|w| QUESTION_WORDS.contains(w))
                .unwrap_or(false);
        let is_task = words.iter().any(|w| {
            HIGH_RISK_VERBS.contains(w) || MEDIUM_RISK_VERBS.contains(w)
        });

        let intent_type = if is_question {
            IntentType::Question
        } else if is_task {
            IntentType::TaskRequest
        } else {
            IntentType::Conversation
        };

        let complexity_signals = COMPLEXITY_KEYWORDS
            .iter()
            .filter(|k| lower.contains(*k))
            .count()
            + entities.file_count() / 4;
        let complexity = match complexity_signals {
            0 => {
                if is_task && words.len() > 12 {
                    Complexity::Moderate
                } else {
                    Complexity::Simple
                }
            }
            1 => Complexity::Moderate,
            2 => Complexity::Complex,
            _ => Complexity::Expert,
        };

        let task_verb_count = words
            .iter()
            .filter(|w| HIGH_RISK_VERBS.contains(*w) || MEDIUM_RISK_VERBS.contains(*w))
            .count();
        let multi_step = lower.contains(" and ")
            || lower.contains(" then ")
            || lower.contains(", then")
            || task_verb_count >= 2;

        let risk_level = score_risk(&action, entities.file_count());

        let follow_up_words: Vec<String> = ["it", "that", "this", "them"]
            .iter()
            .filter(|p| words.contains(&**p))
            .map(|p| p.to_string())
            .collect();
        let follow_up = ctx.previous_intent.is_some() && !follow_up_words.is_empty();

        let confidence = if action.is_empty() {
            0.3
        } else if is_question || is_task {
            0.7
        } else {
            0.5
        };

        Intent {
            intent_type,
            action,
            confidence,
            complexity,
            multi_step,
            risk_level,
            requires_clarification: false,
            suggested_questions: Vec::new(),
            estimated_duration: match complexity {
                Complexity::Simple => 5,
                Complexity::Moderate => 15,
                Complexity::Complex => 45,
                Complexity::Expert => 90,
            },
            context: IntentContext {
                project_aware: ctx.project_summary.is_some(),
                file_specific: !entities.files.is_empty(),
                follow_up,
                references: follow_up_words,
            },
            entities,
        }
    }
}

/// Risk from the action verb, escalated once when more than ten files are
/// involved.
pub fn score_risk(action: &str, file_count: usize) -> RiskLevel {
    let base = if HIGH_RISK_VERBS.contains(&action) {
        RiskLevel::High
    } else if MEDIUM_RISK_VERBS.contains(&action) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };
    if file_count > 10 {
        base.escalate()
    } else {
        base
    }
}

fn extract_entities(input: &str) -> EntitySet {
    let file_pattern = Regex::new(r"[\w./-]*\w\.[A-Za-z0-9]{1,8}\b").expect("static regex");
    let function_pattern = Regex::new(r"\b([a-zA-Z_][a-zA-Z0-9_]*)\(\)").expect("static regex");
    let class_pattern = Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][A-Za-z0-9]*)+\b").expect("static regex");

    let mut entities = EntitySet::default();
    for m in file_pattern.find_iter(input) {
        let found = m.as_str().trim_matches('.').to_string();
        // sentences end with periods; files have a short extension after one
        if found.contains('.') && !entities.files.contains(&found) {
            entities.files.push(found);
        }
    }
    for token in input.split_whitespace() {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '/' && c != '_');
        if token.contains('/') && !token.contains('.') && !token.is_empty() {
            let dir = token.to_string();
            if !entities.directories.contains(&dir) {
                entities.directories.push(dir);
            }
        }
    }
    for capture in function_pattern.captures_iter(input) {
        let name = capture[1].to_string();
        if !entities.functions.contains(&name) {
            entities.functions.push(name);
        }
    }
    for m in class_pattern.find_iter(input) {
        let name = m.as_str().to_string();
        if !entities.classes.contains(&name) {
            entities.classes.push(name);
        }
    }
    let lower = input.to_lowercase();
    for tech in TECHNOLOGIES {
        if lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| w == *tech)
        {
            entities.technologies.push((*tech).to_string());
        }
    }
    entities
}

/// Prefilter result when refinement failed: low confidence, ask for help.
fn degraded(mut intent: Intent) -> Intent {
    intent.confidence = 0.3;
    intent.requires_clarification = true;
    intent
}

/// Field-by-field parse of the model's JSON so one malformed field does not
/// discard the rest.
fn parse_refinement(text: &str) -> Option<Intent> {
    let json = prompts::extract_json_object(text)?;
    let value: Value = serde_json::from_str(json).ok()?;
    let object = value.as_object()?;

    fn field<T: serde::de::DeserializeOwned>(
        object: &serde_json::Map<String, Value>,
        key: &str,
    ) -> Option<T> {
        object
            .get(key)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    let mut intent = Intent::conversational("");
    intent.intent_type = field(object, "type")?;
    intent.action = field(object, "action").unwrap_or_default();
    intent.entities = field(object, "entities").unwrap_or_default();
    intent.confidence = field::<f64>(object, "confidence")
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    intent.complexity = field(object, "complexity").unwrap_or(Complexity::Simple);
    intent.multi_step = field(object, "multiStep").unwrap_or(false);
    intent.risk_level = field(object, "riskLevel").unwrap_or(RiskLevel::Low);
    intent.requires_clarification = field(object, "requiresClarification").unwrap_or(false);
    intent.suggested_questions = field(object, "suggestedQuestions").unwrap_or_default();
    intent.estimated_duration = field(object, "estimatedDuration").unwrap_or(5);
    Some(intent)
}

/// Keep the higher-confidence interpretation field by field; entities are
/// unioned and clarification flags accumulate.
fn merge(prefiltered: Intent, refined: Intent) -> Intent {
    let mut merged = if refined.confidence >= prefiltered.confidence {
        let mut m = refined.clone();
        m.context = prefiltered.context.clone();
        m
    } else {
        prefiltered.clone()
    };
    let mut entities = prefiltered.entities.clone();
    entities.merge(&refined.entities);
    merged.entities = entities;
    merged.requires_clarification =
        prefiltered.requires_clarification || refined.requires_clarification;
    if merged.suggested_questions.is_empty() {
        merged.suggested_questions = refined.suggested_questions;
    }
    merged
}
