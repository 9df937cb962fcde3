//! # ClawLoop Core
//!
//! Domain types, traits, and error definitions for the ClawLoop reasoning/acting
//! agent loop. It depends only on serde and the tokio primitives its traits
//! need, and defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the loop is defined as a trait here: the model
//! [`Provider`], the [`ToolExecutor`], the [`MessageLog`]. Implementations live
//! in their respective crates.

pub mod agent;
pub mod error;
pub mod event;
pub mod log;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::AgentConfig;
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use log::{InMemoryLog, MessageLog};
pub use message::{ContentBlock, GenerationReason, Role, ToolInvocation, ToolOutcome, Turn};
pub use provider::{GenerationOptions, Provider, ProviderRequest, StreamFragment, ToolDefinition, Usage};
pub use tool::{
    ExecutionContext, ExecutionPolicy, Tool, ToolChunk, ToolContext, ToolExecutor, ToolOutput,
    ToolRegistry,
};
