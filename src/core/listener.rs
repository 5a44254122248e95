//! Listener callbacks
//!
//! Each listener kind is its own trait with no-op default methods, and a
//! [`Listeners`] composite holds typed collections of them resolved when the
//! step is built. A failing callback aborts the step: the composite turns any
//! error into `BatchError::Listener` so it can never be mistaken for an item
//! failure and skipped or retried.

use crate::core::retry::CompositeRetryContext;
use crate::domain::{BatchError, Result, StepContribution, StepExecution};
use std::sync::Arc;

pub trait StepListener: Send + Sync {
    fn before_step(&self, _execution: &StepExecution) -> Result<()> {
        Ok(())
    }

    fn after_step(&self, _execution: &StepExecution) -> Result<()> {
        Ok(())
    }
}

pub trait ChunkListener: Send + Sync {
    fn before_chunk(&self) -> Result<()> {
        Ok(())
    }

    /// Called after the chunk transaction committed
    fn after_chunk(&self, _contribution: &StepContribution) -> Result<()> {
        Ok(())
    }

    /// Called after the chunk transaction rolled back
    fn after_chunk_error(&self, _error: &BatchError) -> Result<()> {
        Ok(())
    }
}

pub trait ItemReadListener<I>: Send + Sync {
    fn before_read(&self) -> Result<()> {
        Ok(())
    }

    fn after_read(&self, _item: &I) -> Result<()> {
        Ok(())
    }

    fn on_read_error(&self, _error: &BatchError) -> Result<()> {
        Ok(())
    }
}

pub trait ItemProcessListener<I, O>: Send + Sync {
    fn before_process(&self, _item: &I) -> Result<()> {
        Ok(())
    }

    /// `result` is `None` when the item was filtered
    fn after_process(&self, _item: &I, _result: Option<&O>) -> Result<()> {
        Ok(())
    }

    fn on_process_error(&self, _item: &I, _error: &BatchError) -> Result<()> {
        Ok(())
    }
}

pub trait ItemWriteListener<O>: Send + Sync {
    fn before_write(&self, _items: &[O]) -> Result<()> {
        Ok(())
    }

    fn after_write(&self, _items: &[O]) -> Result<()> {
        Ok(())
    }

    fn on_write_error(&self, _items: &[O], _error: &BatchError) -> Result<()> {
        Ok(())
    }
}

/// Notified once per skipped item, after the skip was committed
pub trait SkipListener<I, O>: Send + Sync {
    fn on_skip_in_read(&self, _error: &BatchError) -> Result<()> {
        Ok(())
    }

    fn on_skip_in_process(&self, _item: &I, _error: &BatchError) -> Result<()> {
        Ok(())
    }

    fn on_skip_in_write(&self, _item: &O, _error: &BatchError) -> Result<()> {
        Ok(())
    }
}

pub trait RetryListener: Send + Sync {
    /// A failed attempt was registered against every key of the composite
    fn on_error(&self, _context: &CompositeRetryContext, _error: &BatchError) -> Result<()> {
        Ok(())
    }

    /// The composite is exhausted and recovery is about to run
    fn on_recover(&self, _context: &CompositeRetryContext) -> Result<()> {
        Ok(())
    }
}

/// A skip waiting to be reported to skip listeners
#[derive(Debug, Clone, PartialEq)]
pub enum SkipEvent<I, O> {
    Read(BatchError),
    Process(I, BatchError),
    Write(O, BatchError),
}

fn listener_error(error: BatchError) -> BatchError {
    match error {
        BatchError::Listener(_) => error,
        other => BatchError::Listener(other.to_string()),
    }
}

/// Typed listener collections of a step
pub struct Listeners<I, O> {
    step: Vec<Arc<dyn StepListener>>,
    chunk: Vec<Arc<dyn ChunkListener>>,
    read: Vec<Arc<dyn ItemReadListener<I>>>,
    process: Vec<Arc<dyn ItemProcessListener<I, O>>>,
    write: Vec<Arc<dyn ItemWriteListener<O>>>,
    skip: Vec<Arc<dyn SkipListener<I, O>>>,
    retry: Vec<Arc<dyn RetryListener>>,
}

impl<I, O> Default for Listeners<I, O> {
    fn default() -> Self {
        Self {
            step: Vec::new(),
            chunk: Vec::new(),
            read: Vec::new(),
            process: Vec::new(),
            write: Vec::new(),
            skip: Vec::new(),
            retry: Vec::new(),
        }
    }
}

impl<I, O> Clone for Listeners<I, O> {
    fn clone(&self) -> Self {
        Self {
            step: self.step.clone(),
            chunk: self.chunk.clone(),
            read: self.read.clone(),
            process: self.process.clone(),
            write: self.write.clone(),
            skip: self.skip.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<I, O> Listeners<I, O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step_listener(&mut self, listener: Arc<dyn StepListener>) {
        self.step.push(listener);
    }

    pub fn add_chunk_listener(&mut self, listener: Arc<dyn ChunkListener>) {
        self.chunk.push(listener);
    }

    pub fn add_read_listener(&mut self, listener: Arc<dyn ItemReadListener<I>>) {
        self.read.push(listener);
    }

    pub fn add_process_listener(&mut self, listener: Arc<dyn ItemProcessListener<I, O>>) {
        self.process.push(listener);
    }

    pub fn add_write_listener(&mut self, listener: Arc<dyn ItemWriteListener<O>>) {
        self.write.push(listener);
    }

    pub fn add_skip_listener(&mut self, listener: Arc<dyn SkipListener<I, O>>) {
        self.skip.push(listener);
    }

    pub fn add_retry_listener(&mut self, listener: Arc<dyn RetryListener>) {
        self.retry.push(listener);
    }

    /// Retry listeners, handed to the retry coordinator
    pub fn retry_listeners(&self) -> Vec<Arc<dyn RetryListener>> {
        self.retry.clone()
    }

    pub fn before_step(&self, execution: &StepExecution) -> Result<()> {
        for l in &self.step {
            l.before_step(execution).map_err(listener_error)?;
        }
        Ok(())
    }

    pub fn after_step(&self, execution: &StepExecution) -> Result<()> {
        for l in &self.step {
            l.after_step(execution).map_err(listener_error)?;
        }
        Ok(())
    }

    pub fn before_chunk(&self) -> Result<()> {
        for l in &self.chunk {
            l.before_chunk().map_err(listener_error)?;
        }
        Ok(())
    }

    pub fn after_chunk(&self, contribution: &StepContribution) -> Result<()> {
        for l in &self.chunk {
            l.after_chunk(contribution).map_err(listener_error)?;
        }
        Ok(())
    }

    pub fn after_chunk_error(&self, error: &BatchError) -> Result<()> {
        for l in &self.chunk {
            l.after_chunk_error(error).map_err(listener_error)?;
        }
        Ok(())
    }

    pub fn before_read(&self) -> Result<()> {
        for l in &self.read {
            l.before_read().map_err(listener_error)?;
        }
        Ok(())
    }

    pub fn after_read(&self, item: &I) -> Result<()> {
        for l in &self.read {
            l.after_read(item).map_err(listener_error)?;
        }
        Ok(())
    }

    pub fn on_read_error(&self, error: &BatchError) -> Result<()> {
        for l in &self.read {
            l.on_read_error(error).map_err(listener_error)?;
        }
        Ok(())
    }

    pub fn before_process(&self, item: &I) -> Result<()> {
        for l in &self.process {
            l.before_process(item).map_err(listener_error)?;
        }
        Ok(())
    }

    pub fn after_process(&self, item: &I, result: Option<&O>) -> Result<()> {
        for l in &self.process {
            l.after_process(item, result).map_err(listener_error)?;
        }
        Ok(())
    }

    pub fn on_process_error(&self, item: &I, error: &BatchError) -> Result<()> {
        for l in &self.process {
            l.on_process_error(item, error).map_err(listener_error)?;
        }
        Ok(())
    }

    pub fn before_write(&self, items: &[O]) -> Result<()> {
        for l in &self.write {
            l.before_write(items).map_err(listener_error)?;
        }
        Ok(())
    }

    pub fn after_write(&self, items: &[O]) -> Result<()> {
        for l in &self.write {
            l.after_write(items).map_err(listener_error)?;
        }
        Ok(())
    }

    pub fn on_write_error(&self, items: &[O], error: &BatchError) -> Result<()> {
        for l in &self.write {
            l.on_write_error(items, error).map_err(listener_error)?;
        }
        Ok(())
    }

    /// Report one skip to every skip listener
    pub fn on_skip(&self, event: &SkipEvent<I, O>) -> Result<()> {
        for l in &self.skip {
            let result = match event {
                SkipEvent::Read(error) => l.on_skip_in_read(error),
                SkipEvent::Process(item, error) => l.on_skip_in_process(item, error),
                SkipEvent::Write(item, error) => l.on_skip_in_write(item, error),
            };
            result.map_err(listener_error)?;
        }
        Ok(())
    }
}
