//! In-memory readers and writers
//!
//! Used by tests and embedding code. The writer buffers every write until the
//! step marks it after a commit, and drops the buffer when the step resets it
//! after a rollback, so [`InMemoryItemWriter::committed`] only ever shows
//! committed items.

use crate::adapters::traits::{ItemReader, ItemStream, ItemWriter};
use crate::domain::{BatchError, ExecutionContext, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

const READER_POSITION_KEY: &str = "memory.reader.position";

/// Reader over a fixed list of read results
pub struct InMemoryItemReader<T> {
    entries: Vec<Result<T>>,
    position: usize,
    marked: usize,
    key: String,
}

impl<T> InMemoryItemReader<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self::from_results(items.into_iter().map(Ok).collect())
    }

    /// Reader replaying `entries`, failed reads included
    pub fn from_results(entries: Vec<Result<T>>) -> Self {
        Self {
            entries,
            position: 0,
            marked: 0,
            key: READER_POSITION_KEY.to_string(),
        }
    }

    /// Store the position under `key` instead of the default one
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

#[async_trait]
impl<T: Send> ItemStream for InMemoryItemReader<T> {
    async fn open(&mut self, context: &ExecutionContext) -> Result<()> {
        self.position = context.get_usize(&self.key).unwrap_or(0);
        self.marked = self.position;
        Ok(())
    }

    async fn update(&mut self, context: &mut ExecutionContext) -> Result<()> {
        context.put_usize(self.key.clone(), self.position);
        Ok(())
    }

    async fn mark(&mut self) -> Result<()> {
        self.marked = self.position;
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        self.position = self.marked;
        Ok(())
    }
}

#[async_trait]
impl<T: Clone + Send> ItemReader<T> for InMemoryItemReader<T> {
    async fn read(&mut self) -> Result<Option<T>> {
        let Some(entry) = self.entries.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        entry.clone().map(Some)
    }
}

type Validator<T> = Arc<dyn Fn(&T) -> std::result::Result<(), String> + Send + Sync>;

struct WriterState<T> {
    committed: Vec<T>,
    pending: Vec<T>,
    attempts: usize,
}

/// Writer collecting items in memory, cloneable as a handle on the results
pub struct InMemoryItemWriter<T> {
    state: Arc<Mutex<WriterState<T>>>,
    validator: Option<Validator<T>>,
}

impl<T> Clone for InMemoryItemWriter<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            validator: self.validator.clone(),
        }
    }
}

impl<T> Default for InMemoryItemWriter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InMemoryItemWriter<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(WriterState {
                committed: Vec::new(),
                pending: Vec::new(),
                attempts: 0,
            })),
            validator: None,
        }
    }

    /// Reject any batch containing an item `validator` refuses
    ///
    /// A rejected batch is not written at all.
    pub fn with_validator(
        mut self,
        validator: impl Fn(&T) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Number of `write` calls, failed ones included
    pub fn write_attempts(&self) -> usize {
        self.state.lock().attempts
    }
}

impl<T: Clone> InMemoryItemWriter<T> {
    /// Items written in committed transactions
    pub fn committed(&self) -> Vec<T> {
        self.state.lock().committed.clone()
    }
}

#[async_trait]
impl<T: Send> ItemStream for InMemoryItemWriter<T> {
    async fn mark(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        let pending = std::mem::take(&mut state.pending);
        state.committed.extend(pending);
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        self.state.lock().pending.clear();
        Ok(())
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> ItemWriter<T> for InMemoryItemWriter<T> {
    async fn write(&mut self, items: &[T]) -> Result<()> {
        let mut state = self.state.lock();
        state.attempts += 1;

        if let Some(validator) = &self.validator {
            for item in items {
                validator(item).map_err(BatchError::Write)?;
            }
        }
        state.pending.extend_from_slice(items);
        Ok(())
    }
}
