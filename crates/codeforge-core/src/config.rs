//! Assistant configuration — serde structs for `<config dir>/config.json`
//!
//! Field names on the wire are camelCase; unknown fields are tolerated and
//! anything missing falls back to the defaults below.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AssistantConfig {
    pub model: String,
    pub base_url: String,
    pub context_window: usize,
    pub temperature: f32,
    pub enable_task_planning: bool,
    pub enable_conversation_history: bool,
    pub enable_context_awareness: bool,
    pub max_conversation_history: usize,
    pub auto_save_conversations: bool,
    pub execution_preferences: ExecutionPreferences,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5-coder:7b".to_string(),
            base_url: "http://localhost:11434".to_string(),
            context_window: 8192,
            temperature: 0.7,
            enable_task_planning: true,
            enable_conversation_history: true,
            enable_context_awareness: true,
            max_conversation_history: 100,
            auto_save_conversations: false,
            execution_preferences: ExecutionPreferences::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionPreferences {
    pub parallelism: usize,
    pub risk_tolerance: RiskTolerance,
    pub auto_execute: bool,
}

impl Default for ExecutionPreferences {
    fn default() -> Self {
        Self {
            parallelism: 4,
            risk_tolerance: RiskTolerance::Balanced,
            auto_execute: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl AssistantConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load `config.json` from `dir`, falling back to defaults when the file
    /// is absent. A present-but-malformed file is an error, not a fallback.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join("config.json");
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Default config directory: `~/.codeforge`.
    pub fn default_dir() -> PathBuf {
        dirs::home_dir().unwrap_or_default().join(".codeforge")
    }
}
