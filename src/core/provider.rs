//! Chunk provider
//!
//! Fills a [`Chunk`] from an [`ItemReader`] up to the commit interval. In fault
//! tolerant mode read failures are classified by the read skip policy: skippable
//! ones are recorded against the chunk and reading goes on, anything else aborts
//! the chunk.

use crate::adapters::traits::ItemReader;
use crate::core::chunk::Chunk;
use crate::core::listener::{Listeners, SkipEvent};
use crate::core::policy::SkipPolicy;
use crate::domain::{Result, StepContribution};
use std::sync::Arc;

pub struct ChunkProvider {
    chunk_size: usize,
    skip_policy: Option<Arc<dyn SkipPolicy>>,
}

impl ChunkProvider {
    /// Provider that propagates every read failure
    pub fn simple(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            skip_policy: None,
        }
    }

    /// Provider that consults `skip_policy` on read failures
    pub fn fault_tolerant(chunk_size: usize, skip_policy: Arc<dyn SkipPolicy>) -> Self {
        Self {
            chunk_size,
            skip_policy: Some(skip_policy),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Read the next chunk
    ///
    /// The returned chunk is flagged as the end of input when the reader was
    /// exhausted while filling it. An empty end chunk means nothing was left.
    ///
    /// # Errors
    ///
    /// Returns the read error when it may not be skipped, the skip policy's
    /// `SkipLimitExceeded`, or a listener error.
    pub async fn provide<I, O>(
        &self,
        reader: &mut dyn ItemReader<I>,
        contribution: &mut StepContribution,
        listeners: &Listeners<I, O>,
    ) -> Result<Chunk<I>>
    where
        I: Send,
    {
        let mut chunk = Chunk::new();

        while chunk.len() < self.chunk_size {
            listeners.before_read()?;
            match reader.read().await {
                Ok(Some(item)) => {
                    listeners.after_read(&item)?;
                    contribution.increment_read_count();
                    chunk.add(item);
                }
                Ok(None) => {
                    chunk.set_end();
                    break;
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    listeners.on_read_error(&error)?;

                    let skip = match &self.skip_policy {
                        Some(policy) => policy.should_skip(&error, contribution.step_skip_count())?,
                        None => false,
                    };
                    if !skip {
                        return Err(error);
                    }

                    contribution.increment_read_skip_count();
                    crate::log_skip!("read", &error, contribution.step_skip_count());
                    chunk.record_read_skip(error);
                }
            }
        }

        tracing::trace!(items = chunk.len(), end = chunk.is_end(), "Chunk provided");
        Ok(chunk)
    }

    /// Report the read failures skipped while filling `chunk`
    ///
    /// Called once the chunk committed. Each failure is reported exactly once,
    /// in the order it was read.
    pub fn post_process<I, O>(&self, chunk: &mut Chunk<I>, listeners: &Listeners<I, O>) -> Result<()> {
        for error in chunk.take_errors() {
            listeners.on_skip(&SkipEvent::Read(error))?;
        }
        Ok(())
    }
}
