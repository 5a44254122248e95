//! Chunk-oriented processing engine
//!
//! # Modules
//!
//! - [`chunk`] - Chunk container and the failure localization window
//! - [`policy`] - Skip, retry and back-off policies
//! - [`retry`] - Stateful retry across transactions
//! - [`listener`] - Listener traits and the composite dispatcher
//! - [`provider`] - Fills chunks from a reader
//! - [`processor`] - Transforms and writes chunks, with retry, skip and scan
//! - [`concurrent`] - Bounded parallel transform
//! - [`step`] - Step loop, builder, chunk monitor and interruption
//!
//! # Example
//!
//! ```rust,no_run
//! use chunkwise::adapters::memory::{InMemoryItemReader, InMemoryItemWriter};
//! use chunkwise::adapters::processors::Trim;
//! use chunkwise::core::policy::{LimitCheckingSkipPolicy, SimpleRetryPolicy};
//! use chunkwise::core::step::StepBuilder;
//! use chunkwise::domain::{ErrorKind, StepName};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let mut step = StepBuilder::new(StepName::new("trim-lines")?)
//!     .chunk_size(100)
//!     .reader(InMemoryItemReader::new(vec![" a ".to_string()]))
//!     .processor(Trim)
//!     .writer(InMemoryItemWriter::new())
//!     .fault_tolerant()
//!     .retry_policy(Arc::new(SimpleRetryPolicy::new(3, [ErrorKind::Write])))
//!     .skip_policy(Arc::new(LimitCheckingSkipPolicy::new(10, [ErrorKind::Write])))
//!     .shutdown_signal(shutdown_rx)
//!     .build()?;
//!
//! let execution = step.execute().await?;
//! println!("{}: {} written", execution.status, execution.write_count);
//! # Ok(())
//! # }
//! ```

pub mod chunk;
pub mod concurrent;
pub mod listener;
pub mod policy;
pub mod processor;
pub mod provider;
pub mod retry;
pub mod step;
