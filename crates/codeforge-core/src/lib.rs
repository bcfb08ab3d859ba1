//! Shared types for codeforge: error taxonomy, the intent/task/plan data
//! model, conversation turns, and the assistant configuration file.

pub mod config;
pub mod error;
pub mod types;

pub use config::{AssistantConfig, ExecutionPreferences, RiskTolerance};
pub use error::{Error, Result};
pub use types::*;
