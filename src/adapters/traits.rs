//! Collaborator traits
//!
//! This module defines the narrow interfaces the chunk engine consumes: an item
//! source, a processing function, an item sink, a transaction manager and a
//! progress store. Adapters implement these to plug into a step.

use crate::domain::execution::ExecutionContext;
use crate::domain::ids::StepName;
use crate::domain::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle hooks shared by readers and writers
///
/// `update` is only called at commit boundaries, so whatever an adapter writes
/// into the context always describes committed progress. `mark` is called after
/// a successful commit and `reset` after a rollback.
#[async_trait]
pub trait ItemStream: Send {
    /// Open the stream, restoring position from a saved checkpoint
    async fn open(&mut self, _context: &ExecutionContext) -> Result<()> {
        Ok(())
    }

    /// Record restart state into the checkpoint
    async fn update(&mut self, _context: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }

    /// Release resources
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Remember the current position as committed
    async fn mark(&mut self) -> Result<()> {
        Ok(())
    }

    /// Return to the last marked position
    async fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Source of items
#[async_trait]
pub trait ItemReader<I>: ItemStream {
    /// Read the next item
    ///
    /// # Returns
    ///
    /// `Ok(None)` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Read` when the next item cannot be produced. The
    /// reader must have advanced past the bad record.
    async fn read(&mut self) -> Result<Option<I>>;
}

/// Item transformation
#[async_trait]
pub trait ItemProcessor<I, O>: Send + Sync {
    /// Transform one item
    ///
    /// # Returns
    ///
    /// `Ok(None)` filters the item out of the chunk.
    async fn process(&self, item: &I) -> Result<Option<O>>;
}

/// Sink of items
#[async_trait]
pub trait ItemWriter<O>: ItemStream {
    /// Write a group of items
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Write` when the group cannot be written. The sink is
    /// not expected to say which item caused the failure.
    async fn write(&mut self, items: &[O]) -> Result<()>;
}

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    Default,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl std::str::FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "read_committed" => Ok(Self::ReadCommitted),
            "repeatable_read" => Ok(Self::RepeatableRead),
            "serializable" => Ok(Self::Serializable),
            _ => Err(format!(
                "isolation must be one of: default, read_committed, repeatable_read, serializable (got '{s}')"
            )),
        }
    }
}

/// Attributes a transaction is started with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionAttributes {
    pub name: String,
    pub isolation: IsolationLevel,
    pub timeout: Option<Duration>,
}

impl TransactionAttributes {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            isolation: IsolationLevel::Default,
            timeout: None,
        }
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Handle of an open transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionHandle {
    pub id: Uuid,
    pub name: String,
    pub started_at: DateTime<Utc>,
}

impl TransactionHandle {
    pub fn new(attributes: &TransactionAttributes) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: attributes.name.clone(),
            started_at: Utc::now(),
        }
    }
}

/// Transaction boundary around one chunk
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Begin a transaction
    async fn begin(&self, attributes: &TransactionAttributes) -> Result<TransactionHandle>;

    /// Commit a transaction
    ///
    /// # Errors
    ///
    /// A commit failure leaves the outcome undetermined; the step loop treats it
    /// as fatal.
    async fn commit(&self, handle: TransactionHandle) -> Result<()>;

    /// Roll back a transaction
    async fn rollback(&self, handle: TransactionHandle) -> Result<()>;
}

/// Persistence of step progress checkpoints
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Load the last saved checkpoint for a step
    ///
    /// # Returns
    ///
    /// `Ok(None)` if the step has never committed a chunk.
    async fn load(&self, step: &StepName) -> Result<Option<ExecutionContext>>;

    /// Save a checkpoint for a step
    async fn save(&self, step: &StepName, context: &ExecutionContext) -> Result<()>;

    /// Discard the checkpoint of a step
    async fn clear(&self, step: &StepName) -> Result<()>;
}
