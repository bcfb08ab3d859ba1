//! codeforge-planner — intent analysis, task planning, and NL routing
//!
//! Three stages between a raw utterance and work: the analyzer produces a
//! structured `Intent`, the router triages it, and the planner turns
//! plan-worthy intents into validated task DAGs.

pub mod intent;
pub mod planner;
pub mod prompts;
pub mod router;

pub use intent::{AnalysisContext, IntentAnalyzer};
pub use planner::{PlanningContext, QualityRequirements, TaskPlanner, UserExperience};
pub use router::{NlRouter, Route};
