//! Conversation store — turn-indexed history with optional persistence
//!
//! Turns are append-only and totally ordered within a conversation; ids are
//! assigned monotonically under the per-conversation lock. With persistence
//! enabled each session is one JSON file holding the ordered turn array.

use codeforge_core::{ContextSnapshot, Error, Result, Turn, UserFeedback};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Clone, Debug, Default)]
pub struct Conversation {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

impl Conversation {
    fn next_turn_id(&self) -> u64 {
        self.turns.last().map(|t| t.id + 1).unwrap_or(1)
    }
}

pub struct ConversationStore {
    conversations: DashMap<String, Arc<Mutex<Conversation>>>,
    dir: Option<PathBuf>,
    auto_save: bool,
    max_history: usize,
}

impl ConversationStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            dir: None,
            auto_save: false,
            max_history: max_history.max(1),
        }
    }

    /// Persist each session to `<dir>/<session>.json`; when `auto_save` is
    /// set every append and update is flushed.
    pub fn with_persistence(mut self, dir: impl Into<PathBuf>, auto_save: bool) -> Self {
        self.dir = Some(dir.into());
        self.auto_save = auto_save;
        self
    }

    fn session_path(&self, session_id: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{}.json", session_id)))
    }

    fn handle(&self, session_id: &str) -> Arc<Mutex<Conversation>> {
        self.conversations
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let turns = self
                    .session_path(session_id)
                    .filter(|p| p.exists())
                    .and_then(|p| match load_turns(&p) {
                        Ok(turns) => {
                            debug!("loaded {} turns for session {}", turns.len(), session_id);
                            Some(turns)
                        }
                        Err(e) => {
                            warn!("could not load session {}: {}", session_id, e);
                            None
                        }
                    })
                    .unwrap_or_default();
                Arc::new(Mutex::new(Conversation {
                    session_id: session_id.to_string(),
                    turns,
                }))
            })
            .clone()
    }

    /// Append a new pending turn and return its id.
    pub async fn append_turn(
        &self,
        session_id: &str,
        input: &str,
        snapshot: ContextSnapshot,
    ) -> u64 {
        let handle = self.handle(session_id);
        let mut conversation = handle.lock().await;
        let id = conversation.next_turn_id();
        conversation.turns.push(Turn::new(id, input, snapshot));
        if conversation.turns.len() > self.max_history {
            let excess = conversation.turns.len() - self.max_history;
            conversation.turns.drain(..excess);
        }
        if self.auto_save {
            self.flush(&conversation);
        }
        id
    }

    /// Mutate a turn in place (response, outcome, intent, actions).
    pub async fn update_turn<F>(&self, session_id: &str, turn_id: u64, update: F) -> Result<()>
    where
        F: FnOnce(&mut Turn),
    {
        let handle = self.handle(session_id);
        let mut conversation = handle.lock().await;
        let turn = conversation
            .turns
            .iter_mut()
            .find(|t| t.id == turn_id)
            .ok_or_else(|| Error::validation(format!("no turn {} in session", turn_id)))?;
        update(turn);
        if self.auto_save {
            self.flush(&conversation);
        }
        Ok(())
    }

    pub async fn record_feedback(
        &self,
        session_id: &str,
        turn_id: u64,
        feedback: UserFeedback,
    ) -> Result<()> {
        self.update_turn(session_id, turn_id, |turn| {
            turn.feedback = Some(feedback);
        })
        .await
    }

    /// The most recent `n` turns, oldest first.
    pub async fn recent(&self, session_id: &str, n: usize) -> Vec<Turn> {
        let handle = self.handle(session_id);
        let conversation = handle.lock().await;
        let start = conversation.turns.len().saturating_sub(n);
        conversation.turns[start..].to_vec()
    }

    pub async fn turn_count(&self, session_id: &str) -> usize {
        self.handle(session_id).lock().await.turns.len()
    }

    pub async fn last_turn(&self, session_id: &str) -> Option<Turn> {
        self.handle(session_id).lock().await.turns.last().cloned()
    }

    /// Explicit save, independent of auto_save.
    pub async fn save(&self, session_id: &str) -> Result<()> {
        let handle = self.handle(session_id);
        let conversation = handle.lock().await;
        let path = self
            .session_path(session_id)
            .ok_or_else(|| Error::validation("store has no persistence directory".to_string()))?;
        write_turns(&path, &conversation.turns)
    }

    fn flush(&self, conversation: &Conversation) {
        if let Some(path) = self.session_path(&conversation.session_id) {
            if let Err(e) = write_turns(&path, &conversation.turns) {
                warn!("failed to persist session {}: {}", conversation.session_id, e);
            }
        }
    }
}

fn load_turns(path: &PathBuf) -> Result<Vec<Turn>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_turns(path: &PathBuf, turns: &[Turn]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(turns)?)?;
    Ok(())
}
