//! Message log trait — the append-only conversation record.
//!
//! The log is the single source of truth for a conversation. Turns are only
//! ever appended; corrections happen by appending new turns.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::LogError;
use crate::message::Turn;

/// An append-only ordered sequence of turns.
///
/// Implementations: in-memory (testing, ephemeral sessions); persistent
/// stores live outside this crate.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// All turns in append order.
    async fn all(&self) -> Result<Vec<Turn>, LogError>;

    /// Append a turn.
    async fn append(&self, turn: Turn) -> Result<(), LogError>;

    /// Number of turns stored.
    async fn len(&self) -> Result<usize, LogError> {
        Ok(self.all().await?.len())
    }
}

/// An in-memory log backed by a Vec.
#[derive(Clone, Default)]
pub struct InMemoryLog {
    turns: Arc<RwLock<Vec<Turn>>>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a log with existing turns.
    pub fn with_turns(turns: Vec<Turn>) -> Self {
        Self {
            turns: Arc::new(RwLock::new(turns)),
        }
    }
}

#[async_trait]
impl MessageLog for InMemoryLog {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn all(&self) -> Result<Vec<Turn>, LogError> {
        Ok(self.turns.read().await.clone())
    }

    async fn append(&self, turn: Turn) -> Result<(), LogError> {
        self.turns.write().await.push(turn);
        Ok(())
    }

    async fn len(&self) -> Result<usize, LogError> {
        Ok(self.turns.read().await.len())
    }
}
