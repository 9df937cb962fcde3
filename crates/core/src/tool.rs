//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world. The loop
//! never calls a tool directly: it hands a batch of invocations to a
//! [`ToolExecutor`] together with an [`ExecutionPolicy`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::message::{ToolInvocation, ToolOutcome};
use crate::provider::ToolDefinition;

/// What a tool produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The output content (or placeholder when suspended)
    pub content: String,

    /// The result must come from outside the loop (e.g. a human)
    #[serde(default)]
    pub suspended: bool,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            suspended: false,
        }
    }

    pub fn suspend(placeholder: impl Into<String>) -> Self {
        Self {
            content: placeholder.into(),
            suspended: true,
        }
    }
}

/// A progress chunk streamed by a running tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolChunk {
    pub invocation_id: String,
    pub content: String,
}

/// Per-invocation handle passed to [`Tool::execute`].
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub invocation_id: String,
    pub cancel: CancellationToken,
    chunks: Option<mpsc::UnboundedSender<ToolChunk>>,
}

impl ToolContext {
    /// Stream a progress chunk to the acting-chunk hooks. A no-op when nobody listens.
    pub fn emit_chunk(&self, content: impl Into<String>) {
        if let Some(tx) = &self.chunks {
            let _ = tx.send(ToolChunk {
                invocation_id: self.invocation_id.clone(),
                content: content.into(),
            });
        }
    }
}

/// Batch-level context handed to the executor.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Name of the agent running the batch
    pub agent_name: String,

    /// Cancelled when the run is interrupted
    pub cancel: CancellationToken,

    chunks: Option<mpsc::UnboundedSender<ToolChunk>>,
}

impl ExecutionContext {
    pub fn new(agent_name: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            agent_name: agent_name.into(),
            cancel,
            chunks: None,
        }
    }

    /// Route tool progress chunks into the given channel.
    pub fn with_chunk_sink(mut self, tx: mpsc::UnboundedSender<ToolChunk>) -> Self {
        self.chunks = Some(tx);
        self
    }

    pub fn for_invocation(&self, invocation_id: &str) -> ToolContext {
        ToolContext {
            invocation_id: invocation_id.to_string(),
            cancel: self.cancel.clone(),
            chunks: self.chunks.clone(),
        }
    }
}

/// Timeout and retry policy for tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    /// Per-attempt timeout
    pub timeout: Duration,

    /// Additional attempts after the first failure (retryable errors only)
    pub max_retries: u32,

    /// Delay before the first retry; doubles for each further retry
    pub backoff: Duration,

    /// Upper bound on the retry delay
    pub max_backoff: Duration,

    /// Run the invocations of one batch concurrently
    pub concurrent: bool,
}

impl ExecutionPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 2,
            backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            concurrent: true,
        }
    }
}

/// The core Tool trait.
///
/// Each tool implements this trait and is registered in the ToolRegistry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "search", "ask_user").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// Cloning (or [`snapshot`](Self::snapshot)) copies the name → tool map, so
/// two agents never share one mutable registry.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// An independent copy of this registry.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Executes a batch of tool invocations.
///
/// The returned outcomes are parallel in length and order to `invocations`.
/// Failures are reported as ordinary (non-suspended) outcome content.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        invocations: &[ToolInvocation],
        policy: &ExecutionPolicy,
        ctx: &ExecutionContext,
    ) -> Vec<ToolOutcome>;
}
