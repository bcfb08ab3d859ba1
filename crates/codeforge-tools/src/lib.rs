//! codeforge-tools — tool contract, registry, orchestrator, and builtins
//!
//! Each tool is a self-contained module in src/tools/. To add a tool:
//! create the file, implement the Tool trait, register it in
//! create_default_registry().

pub mod context;
pub mod orchestrator;
pub mod registry;
pub mod safety;
pub mod tools;

pub use context::ExecutionContext;
pub use orchestrator::{
    Execution, ExecutionRequest, ExecutionStatus, OrchestrationPlan, OrchestratorConfig,
    ToolEvent, ToolOrchestrator,
};
pub use registry::{
    ParamType, ResultMetadata, Tool, ToolMetadata, ToolParameter, ToolRegistry, ToolResult,
};

use std::sync::Arc;

/// Create the default tool registry with all builtin tools.
///
/// Tools are stateless; paths come from the `ExecutionContext` per call, so
/// no workspace root is baked in here.
pub fn create_default_registry() -> codeforge_core::Result<ToolRegistry> {
    let registry = ToolRegistry::new();

    // --- Read-only tools ---
    registry.register(Arc::new(tools::search::SearchTool::new()))?;
    registry.register(Arc::new(tools::git::GitTool::new()))?;
    registry.register(Arc::new(tools::analyze::CodeAnalysisTool::new()))?;

    // --- Mutation / execution tools ---
    registry.register(Arc::new(tools::filesystem::FileSystemTool::new()))?;
    registry.register(Arc::new(tools::execute::ExecuteTool::new()))?;
    registry.register(Arc::new(tools::testing::TestingTool::new()))?;

    Ok(registry)
}
