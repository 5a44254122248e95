// Chunkwise - Chunk-oriented batch processing engine
// Copyright (c) 2025 Chunkwise Contributors
// Licensed under the MIT License

//! # Chunkwise - Chunk-oriented batch processing
//!
//! Chunkwise reads items from a source, transforms them, and writes them to a
//! sink in fixed-size chunks, each committed in its own transaction. Progress
//! is checkpointed after every commit so an interrupted step resumes where it
//! stopped.
//!
//! ## Overview
//!
//! - **Chunks**: items are read until the chunk is full, processed, then
//!   written as one group inside one transaction
//! - **Retry**: failed items are retried across transactions, with per-item
//!   attempt counts kept in a bounded cache
//! - **Skip**: items that keep failing are skipped under a step-wide limit,
//!   and skip listeners hear about them only after the skip commits
//! - **Scan**: a failed group write is narrowed down to the item that caused
//!   it, either one item at a time or by bisection
//! - **Restart**: readers and writers store their position in an execution
//!   context persisted by a progress store
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Chunk engine: provider, processor, retry, policies, step loop
//! - [`adapters`] - Readers, writers, processors, stores, transaction managers
//! - [`domain`] - Execution records, identifiers and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chunkwise::adapters::memory::{InMemoryItemReader, InMemoryItemWriter};
//! use chunkwise::adapters::processors::FnProcessor;
//! use chunkwise::core::policy::{LimitCheckingSkipPolicy, SimpleRetryPolicy};
//! use chunkwise::core::step::StepBuilder;
//! use chunkwise::domain::{BatchError, BatchStatus, ErrorKind, StepName};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let writer = InMemoryItemWriter::new();
//!
//!     let mut step = StepBuilder::new(StepName::new("parse-prices")?)
//!         .chunk_size(100)
//!         .reader(InMemoryItemReader::new(vec!["12".to_string(), "x".to_string()]))
//!         .processor(FnProcessor::new(|line: &String| {
//!             line.parse::<u32>()
//!                 .map(Some)
//!                 .map_err(|e| BatchError::Process(e.to_string()))
//!         }))
//!         .writer(writer.clone())
//!         .fault_tolerant()
//!         .retry_policy(Arc::new(SimpleRetryPolicy::new(2, [ErrorKind::Write])))
//!         .skip_policy(Arc::new(LimitCheckingSkipPolicy::new(5, [ErrorKind::Process])))
//!         .build()?;
//!
//!     let execution = step.execute().await?;
//!     assert_eq!(execution.status, BatchStatus::Completed);
//!     assert_eq!(writer.committed(), vec![12]);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`domain::Result`], whose error type
//! [`domain::BatchError`] separates item failures, which policies may retry
//! or skip, from fatal ones that end the step.
//!
//! ## Logging
//!
//! Chunkwise uses structured logging with the `tracing` crate; see
//! [`logging::init_logging`].

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
