//! NL router — triage an utterance to command, task plan, or conversation

use codeforge_core::{Complexity, Intent, RiskLevel};

/// Routing decision for one utterance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// The utterance names a registered command.
    Command { name: String, args: Vec<String> },
    /// Plan-worthy work: multi-step, complex, or risky.
    TaskPlan,
    /// Everything else goes straight to the model.
    Conversation,
}

/// Pure dispatcher over a fixed set of registered command names.
pub struct NlRouter {
    commands: Vec<String>,
}

impl NlRouter {
    pub fn new(commands: Vec<String>) -> Self {
        Self {
            commands: commands.into_iter().map(|c| c.to_lowercase()).collect(),
        }
    }

    pub fn route(&self, input: &str, intent: &Intent) -> Route {
        if let Some(route) = self.match_command(input) {
            return route;
        }

        if intent.multi_step
            || matches!(intent.complexity, Complexity::Complex | Complexity::Expert)
            || intent.risk_level == RiskLevel::High
        {
            return Route::TaskPlan;
        }

        Route::Conversation
    }

    /// Exact first-token match, or a near-prefix match (edit distance ≤ 1)
    /// for single-token utterances.
    fn match_command(&self, input: &str) -> Option<Route> {
        let mut tokens = input.split_whitespace();
        let first = tokens.next()?.to_lowercase();
        let args: Vec<String> = tokens.map(String::from).collect();

        if self.commands.iter().any(|c| *c == first) {
            return Some(Route::Command { name: first, args });
        }
        if args.is_empty() {
            if let Some(close) = self
                .commands
                .iter()
                .find(|c| levenshtein(c, &first) <= 1)
            {
                return Some(Route::Command {
                    name: close.clone(),
                    args,
                });
            }
        }
        None
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut previous_diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous_diagonal + usize::from(ca != cb);
            previous_diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(previous_diagonal + 1);
        }
    }
    row[b.len()]
}
