//! Loop events — what observers see of a running controller.
//!
//! The controller publishes an event after each model call, each tool
//! result, and at the end of every run. Observers subscribe to the bus and
//! never influence the loop; use hooks for that.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::message::{GenerationReason, ToolOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A model call finished streaming
    ResponseGenerated {
        agent: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// One tool call produced its outcome
    ToolExecuted {
        tool_name: String,
        success: bool,
        suspended: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A run reached a terminal turn
    LoopFinished {
        agent: String,
        reason: GenerationReason,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },

    /// A run ended with an error, including interruption
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Describe a tool outcome. Outcomes carrying an `Error:` payload count as failures.
    pub fn tool_executed(outcome: &ToolOutcome, duration_ms: u64) -> Self {
        Self::ToolExecuted {
            tool_name: outcome.name.clone(),
            success: !outcome.output.starts_with("Error:"),
            suspended: outcome.suspended,
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn loop_finished(agent: impl Into<String>, reason: GenerationReason, iterations: u32) -> Self {
        Self::LoopFinished {
            agent: agent.into(),
            reason,
            iterations,
            timestamp: Utc::now(),
        }
    }

    pub fn error(context: impl Into<String>, error: &dyn std::fmt::Display) -> Self {
        Self::ErrorOccurred {
            context: context.into(),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ResponseGenerated { timestamp, .. }
            | Self::ToolExecuted { timestamp, .. }
            | Self::LoopFinished { timestamp, .. }
            | Self::ErrorOccurred { timestamp, .. } => *timestamp,
        }
    }
}

/// Fan-out of [`DomainEvent`]s over a `tokio::sync::broadcast` channel.
///
/// Slow subscribers lag and lose the oldest events; publishing never waits.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to current subscribers and return how many received it.
    pub fn publish(&self, event: DomainEvent) -> usize {
        self.sender.send(Arc::new(event)).unwrap_or(0)
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
