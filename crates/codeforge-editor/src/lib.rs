//! codeforge-editor — atomic, backup-based multi-file mutation engine
//!
//! Either every edit in a transaction lands on disk or none does. No file
//! is ever mutated before its original bytes exist under a backup path.

pub mod editor;
pub mod validate;

pub use editor::{Edit, EditResult, SafeCodeEditor};
pub use validate::ValidationLevel;
