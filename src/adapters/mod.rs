//! Collaborators of the chunk engine
//!
//! - [`traits`] - Reader, processor, writer, transaction and progress interfaces
//! - [`memory`] - In-memory reader and writer
//! - [`file`] - Line-oriented file reader and writer
//! - [`processors`] - Built-in item processors
//! - [`progress`] - File and in-memory checkpoint stores
//! - [`transaction`] - Transaction managers
//!
//! # Example
//!
//! ```rust,no_run
//! use chunkwise::adapters::file::{LineItemReader, LineItemWriter};
//! use chunkwise::adapters::processors::Uppercase;
//! use chunkwise::adapters::progress::FileProgressStore;
//! use chunkwise::core::step::StepBuilder;
//! use chunkwise::domain::StepName;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut step = StepBuilder::new(StepName::new("shout")?)
//!     .chunk_size(500)
//!     .reader(LineItemReader::new("input.txt"))
//!     .processor(Uppercase)
//!     .writer(LineItemWriter::new("output.txt"))
//!     .progress_store(Arc::new(FileProgressStore::new(".chunkwise/state")))
//!     .build()?;
//!
//! step.execute().await?;
//! # Ok(())
//! # }
//! ```

pub mod file;
pub mod memory;
pub mod processors;
pub mod progress;
pub mod traits;
pub mod transaction;
