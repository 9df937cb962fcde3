//! Tool execution and built-in tools for ClawLoop.
//!
//! [`RegistryExecutor`] runs batches of tool invocations under an execution
//! policy. The built-in tools cover the two control-flow needs of the loop:
//! asking a human (suspension) and submitting a structured final answer.

pub mod ask_user;
pub mod executor;
pub mod finish;

use clawloop_core::tool::ToolRegistry;
use std::sync::Arc;

pub use ask_user::{ASK_USER_TOOL, AskUserTool};
pub use executor::RegistryExecutor;
pub use finish::{FINISH_TOOL, FinishTool};

/// Create a default tool registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(AskUserTool));
    registry.register(Arc::new(FinishTool::new()));
    registry
}
