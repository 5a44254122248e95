//! Chunk-oriented step execution
//!
//! [`ChunkStep`] runs the read-process-write loop one transaction per chunk:
//!
//! 1. **Restore**: load the checkpoint and open the streams with it
//! 2. **Provide**: read up to `chunk_size` items (or reuse the busy chunk)
//! 3. **Process**: transform and write through the [`ChunkProcessor`]
//! 4. **Commit**: update the streams, save progress, commit, apply counts
//! 5. **Rollback**: on failure keep the skip counts and carry a busy chunk into
//!    the next transaction, or fail the step
//!
//! Interruption is only honored between chunks.

pub mod builder;
pub mod interrupt;
pub mod monitor;

pub use builder::StepBuilder;
pub use interrupt::InterruptionPolicy;
pub use monitor::{ChunkMonitor, OFFSET_KEY};

use crate::adapters::traits::{
    ItemReader, ItemWriter, ProgressStore, TransactionAttributes, TransactionHandle,
    TransactionManager,
};
use crate::core::listener::Listeners;
use crate::core::processor::{ChunkProcessor, ChunkState};
use crate::core::provider::ChunkProvider;
use crate::domain::{BatchError, BatchStatus, Result, StepContribution, StepExecution, StepName};
use std::hash::Hash;
use std::sync::Arc;

/// Outcome of one chunk transaction
enum Flow {
    Continue,
    Finished(BatchStatus),
}

pub struct ChunkStep<I, O> {
    name: StepName,
    reader: Box<dyn ItemReader<I>>,
    writer: Box<dyn ItemWriter<O>>,
    provider: ChunkProvider,
    processor: ChunkProcessor<I, O>,
    transaction_manager: Arc<dyn TransactionManager>,
    transaction_attributes: TransactionAttributes,
    progress_store: Arc<dyn ProgressStore>,
    listeners: Listeners<I, O>,
    interruption: InterruptionPolicy,
    monitor: ChunkMonitor,
    buffering: bool,
}

impl<I, O> ChunkStep<I, O>
where
    I: Clone + Hash + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    pub fn name(&self) -> &StepName {
        &self.name
    }

    pub fn chunk_size(&self) -> usize {
        self.provider.chunk_size()
    }

    /// Run the step until the source is exhausted, it is stopped, or it fails
    ///
    /// # Returns
    ///
    /// The finished execution. Its status tells how the run ended.
    ///
    /// # Errors
    ///
    /// Returns an error only when the step could not start: the checkpoint
    /// could not be loaded, a stream failed to open, or a step listener
    /// rejected the start.
    pub async fn execute(&mut self) -> Result<StepExecution> {
        let mut execution = StepExecution::new(self.name.clone());
        execution.mark_started();

        tracing::info!(
            step = %self.name,
            chunk_size = self.provider.chunk_size(),
            fault_tolerant = self.processor.is_fault_tolerant(),
            buffering = self.buffering,
            "Starting step"
        );

        if let Err(error) = self.open(&mut execution).await {
            tracing::error!(step = %self.name, error = %error, "Step failed to start");
            self.close(&mut execution).await;
            return Err(error);
        }

        let mut state: Option<ChunkState<I, O>> = None;
        let status = loop {
            if let Flow::Finished(status) = self.run_chunk(&mut execution, &mut state).await {
                break status;
            }
        };

        if status == BatchStatus::Completed {
            if let Err(error) = self.progress_store.clear(&self.name).await {
                tracing::warn!(step = %self.name, error = %error, "Failed to clear checkpoint");
            }
        }

        self.close(&mut execution).await;
        execution.finish(status);

        if let Err(error) = self.listeners.after_step(&execution) {
            execution.add_failure(error.to_string());
            execution.status = BatchStatus::Failed;
        }

        execution.log_summary();
        Ok(execution)
    }

    async fn open(&mut self, execution: &mut StepExecution) -> Result<()> {
        self.listeners.before_step(execution)?;

        if let Some(context) = self.progress_store.load(&self.name).await? {
            tracing::info!(step = %self.name, entries = context.len(), "Restoring checkpoint");
            execution.execution_context = context;
        }

        self.monitor
            .open(self.reader.as_mut(), &execution.execution_context)
            .await?;
        self.writer.open(&execution.execution_context).await?;

        self.reader.mark().await?;
        self.writer.mark().await?;
        Ok(())
    }

    async fn close(&mut self, execution: &mut StepExecution) {
        if let Err(error) = self.reader.close().await {
            tracing::warn!(step = %self.name, error = %error, "Failed to close reader");
            execution.add_failure(format!("reader close: {error}"));
        }
        if let Err(error) = self.writer.close().await {
            tracing::warn!(step = %self.name, error = %error, "Failed to close writer");
            execution.add_failure(format!("writer close: {error}"));
        }
    }

    async fn run_chunk(
        &mut self,
        execution: &mut StepExecution,
        slot: &mut Option<ChunkState<I, O>>,
    ) -> Flow {
        if let Err(error) = self.interruption.check(execution) {
            tracing::info!(step = %self.name, reason = %error, "Step interrupted");
            return Flow::Finished(BatchStatus::Stopped);
        }

        if let Err(error) = self.listeners.before_chunk() {
            return self.fail(execution, error, BatchStatus::Failed);
        }

        let mut contribution = StepContribution::for_step(execution);
        let handle = match self
            .transaction_manager
            .begin(&self.transaction_attributes)
            .await
        {
            Ok(handle) => handle,
            Err(error) => return self.fail(execution, error, BatchStatus::Failed),
        };

        match self.process_chunk(&mut contribution, slot).await {
            Ok(()) => self.commit(execution, contribution, handle, slot).await,
            Err(error) => self.rollback(execution, contribution, handle, slot, error).await,
        }
    }

    async fn process_chunk(
        &mut self,
        contribution: &mut StepContribution,
        slot: &mut Option<ChunkState<I, O>>,
    ) -> Result<()> {
        if slot.is_none() {
            let chunk = self
                .provider
                .provide(self.reader.as_mut(), contribution, &self.listeners)
                .await?;
            *slot = Some(ChunkState::new(chunk));
        }

        let Some(state) = slot.as_mut() else {
            return Ok(());
        };
        self.processor
            .process(self.writer.as_mut(), contribution, state, &self.listeners)
            .await
    }

    async fn commit(
        &mut self,
        execution: &mut StepExecution,
        mut contribution: StepContribution,
        handle: TransactionHandle,
        slot: &mut Option<ChunkState<I, O>>,
    ) -> Flow {
        let Some(state) = slot.as_mut() else {
            return self.fail(
                execution,
                BatchError::Other("no chunk to commit".to_string()),
                BatchStatus::Failed,
            );
        };
        contribution.read_count += state.take_carried_reads();
        let busy = state.is_busy();
        let end = state.is_end();

        if let Err(error) = self
            .save_progress(execution, state.first_unresolved_ordinal())
            .await
        {
            if let Err(rollback_error) = self.transaction_manager.rollback(handle).await {
                tracing::error!(error = %rollback_error, "Rollback after failed progress save failed");
            }
            execution.increment_rollback_count();
            let error = BatchError::FatalCommit(format!("failed to save progress: {error}"));
            return self.fail(execution, error, BatchStatus::Failed);
        }

        if let Err(error) = self.transaction_manager.commit(handle).await {
            let error = BatchError::FatalCommit(format!("commit outcome unknown: {error}"));
            return self.fail(execution, error, BatchStatus::Unknown);
        }

        execution.execution_context.clear_dirty();
        execution.apply(&contribution);
        execution.increment_commit_count();

        if let Err(error) = self.after_commit(&contribution, state).await {
            return self.fail(execution, error, BatchStatus::Failed);
        }

        crate::log_chunk_commit!(
            &self.name,
            execution.commit_count,
            contribution.read_count,
            contribution.write_count,
            contribution.skip_count()
        );

        if busy {
            tracing::debug!(step = %self.name, "Chunk partially committed, continuing scan");
            return Flow::Continue;
        }

        *slot = None;
        if end {
            Flow::Finished(BatchStatus::Completed)
        } else {
            Flow::Continue
        }
    }

    async fn save_progress(
        &mut self,
        execution: &mut StepExecution,
        unresolved: Option<usize>,
    ) -> Result<()> {
        self.monitor
            .update(self.reader.as_mut(), &mut execution.execution_context, unresolved)
            .await?;
        self.writer.update(&mut execution.execution_context).await?;
        self.progress_store
            .save(&self.name, &execution.execution_context)
            .await
    }

    async fn after_commit(
        &mut self,
        contribution: &StepContribution,
        state: &mut ChunkState<I, O>,
    ) -> Result<()> {
        self.reader.mark().await?;
        self.writer.mark().await?;

        self.provider
            .post_process(state.inputs_mut(), &self.listeners)?;
        self.processor.post_process(&self.listeners)?;
        self.listeners.after_chunk(contribution)
    }

    async fn rollback(
        &mut self,
        execution: &mut StepExecution,
        mut contribution: StepContribution,
        handle: TransactionHandle,
        slot: &mut Option<ChunkState<I, O>>,
        error: BatchError,
    ) -> Flow {
        execution.increment_rollback_count();

        // replayed reads hit the same failures again
        if !self.buffering {
            contribution.read_skip_count = 0;
        }
        execution.apply_skips(&contribution);

        tracing::warn!(
            step = %self.name,
            rollback = execution.rollback_count,
            error = %error,
            "Rolling back chunk"
        );

        if let Err(rollback_error) = self.reset_after_rollback(handle, &error).await {
            return self.fail(execution, rollback_error, BatchStatus::Failed);
        }

        if let BatchError::Interrupted(_) = error {
            tracing::info!(step = %self.name, reason = %error, "Step interrupted");
            return Flow::Finished(BatchStatus::Stopped);
        }

        let busy = slot.as_ref().is_some_and(ChunkState::is_busy);
        if busy && !error.is_fatal() {
            if self.buffering {
                if let Some(state) = slot.as_mut() {
                    state.carry_reads(contribution.read_count);
                }
            } else {
                *slot = None;
            }
            return Flow::Continue;
        }

        *slot = None;
        self.fail(execution, error, BatchStatus::Failed)
    }

    async fn reset_after_rollback(
        &mut self,
        handle: TransactionHandle,
        error: &BatchError,
    ) -> Result<()> {
        self.transaction_manager.rollback(handle).await?;
        self.writer.reset().await?;
        if !self.buffering {
            self.reader.reset().await?;
        }
        self.listeners.after_chunk_error(error)
    }

    fn fail(&self, execution: &mut StepExecution, error: BatchError, status: BatchStatus) -> Flow {
        crate::log_error_with_context!(&error, self.name.as_str());
        execution.add_failure(error.to_string());
        Flow::Finished(status)
    }
}
