//! codeforge-context — repository index and relevance-ranked context slices

pub mod project;

pub use project::{FileInfo, ProjectContext};
