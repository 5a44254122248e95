//! Reader position tracking for partially committed chunks
//!
//! A buffered scan commits a chunk over several transactions. Until the whole
//! chunk is handled the reader must not record a position past it, so instead
//! the monitor stores how many reads of the chunk are already done under
//! [`OFFSET_KEY`]. On restart the reader reopens at the start of the chunk and
//! the monitor skips that many reads.

use crate::adapters::traits::ItemReader;
use crate::domain::{ExecutionContext, Result};

/// Execution context key of the committed offset within the current chunk
pub const OFFSET_KEY: &str = "chunk.monitor.offset";

#[derive(Debug, Default)]
pub struct ChunkMonitor {
    base: usize,
}

impl ChunkMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads already committed before the chunk in flight started
    pub fn base(&self) -> usize {
        self.base
    }

    /// Open `reader` and fast-forward past reads committed by a partial scan
    ///
    /// Failed reads count as consumed, they were skipped when first seen.
    pub async fn open<I: Send>(
        &mut self,
        reader: &mut dyn ItemReader<I>,
        context: &ExecutionContext,
    ) -> Result<()> {
        reader.open(context).await?;

        let offset = context.get_usize(OFFSET_KEY).unwrap_or(0);
        for consumed in 0..offset {
            match reader.read().await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::warn!(
                        offset = offset,
                        consumed = consumed,
                        "Source ended while restoring chunk position"
                    );
                    break;
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    tracing::debug!(error = %error, "Skipping failed read while restoring position");
                }
            }
        }

        if offset > 0 {
            tracing::info!(offset = offset, "Restored position inside partially committed chunk");
        }
        self.base = offset;
        Ok(())
    }

    /// Record the reader position at commit
    ///
    /// `unresolved` is the read ordinal of the first item of the chunk not yet
    /// handled, or `None` once the chunk is complete.
    pub async fn update<I: Send>(
        &mut self,
        reader: &mut dyn ItemReader<I>,
        context: &mut ExecutionContext,
        unresolved: Option<usize>,
    ) -> Result<()> {
        match unresolved {
            Some(ordinal) => {
                context.put_usize(OFFSET_KEY, self.base + ordinal);
            }
            None => {
                reader.update(context).await?;
                context.remove(OFFSET_KEY);
                self.base = 0;
            }
        }
        Ok(())
    }
}
