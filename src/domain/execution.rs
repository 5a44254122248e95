//! Step execution model
//!
//! This module defines the status, counters and progress checkpoint of one step
//! run. Counters live in two places: a [`StepContribution`] accumulates what a
//! single transaction did, and [`StepExecution`] holds the committed totals.

use crate::domain::ids::StepName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Status of a step execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Created but not yet running
    #[default]
    Starting,
    /// Chunk loop is running
    Started,
    /// Input exhausted and every chunk committed
    Completed,
    /// Aborted by an unrecoverable error
    Failed,
    /// Stopped by a cooperative interruption request
    Stopped,
    /// Commit outcome could not be determined
    Unknown,
}

impl BatchStatus {
    /// Whether the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Stopped | BatchStatus::Unknown
        )
    }

    /// Whether the status represents an unsuccessful run
    pub fn is_unsuccessful(&self) -> bool {
        matches!(self, BatchStatus::Failed | BatchStatus::Unknown)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BatchStatus::Starting => "STARTING",
            BatchStatus::Started => "STARTED",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Failed => "FAILED",
            BatchStatus::Stopped => "STOPPED",
            BatchStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// Counters accumulated by a single chunk transaction
///
/// Merged into [`StepExecution`] only after a successful commit. On rollback only
/// the skip counts are carried over, since skip decisions are never replayed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepContribution {
    pub read_count: usize,
    pub write_count: usize,
    pub filter_count: usize,
    pub read_skip_count: usize,
    pub process_skip_count: usize,
    pub write_skip_count: usize,
    /// Skips already committed to the step when this contribution was created
    pub prior_skip_count: usize,
}

impl StepContribution {
    /// Create an empty contribution
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a contribution for the next transaction of a step
    pub fn for_step(execution: &StepExecution) -> Self {
        Self {
            prior_skip_count: execution.skip_count(),
            ..Self::default()
        }
    }

    pub fn increment_read_count(&mut self) {
        self.read_count += 1;
    }

    pub fn increment_write_count(&mut self, count: usize) {
        self.write_count += count;
    }

    pub fn increment_filter_count(&mut self, count: usize) {
        self.filter_count += count;
    }

    pub fn increment_read_skip_count(&mut self) {
        self.read_skip_count += 1;
    }

    pub fn increment_process_skip_count(&mut self) {
        self.process_skip_count += 1;
    }

    pub fn increment_write_skip_count(&mut self) {
        self.write_skip_count += 1;
    }

    /// Total skips recorded in this contribution
    pub fn skip_count(&self) -> usize {
        self.read_skip_count + self.process_skip_count + self.write_skip_count
    }

    /// Skips of the whole step, this contribution included
    ///
    /// Skip limits apply to this count.
    pub fn step_skip_count(&self) -> usize {
        self.prior_skip_count + self.skip_count()
    }
}

/// Opaque key-value progress checkpoint
///
/// Adapters write their restart position here during `update`, which the step
/// loop only calls at commit boundaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    entries: BTreeMap<String, Value>,
    #[serde(skip)]
    dirty: bool,
}

impl ExecutionContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
        self.dirty = true;
    }

    pub fn put_usize(&mut self, key: impl Into<String>, value: usize) {
        self.put(key, Value::from(value as u64));
    }

    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.put(key, Value::String(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.entries
            .get(key)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the context changed since the last [`ExecutionContext::clear_dirty`]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

/// Execution record of one step run
#[derive(Debug, Clone)]
pub struct StepExecution {
    pub step_name: StepName,
    pub status: BatchStatus,
    pub read_count: usize,
    pub write_count: usize,
    pub filter_count: usize,
    pub read_skip_count: usize,
    pub process_skip_count: usize,
    pub write_skip_count: usize,
    pub commit_count: usize,
    pub rollback_count: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub failures: Vec<String>,
    pub execution_context: ExecutionContext,
    /// Internal stop request, honored at the next chunk boundary
    pub terminate_only: bool,
}

impl StepExecution {
    /// Create a new execution for a step
    pub fn new(step_name: StepName) -> Self {
        Self {
            step_name,
            status: BatchStatus::Starting,
            read_count: 0,
            write_count: 0,
            filter_count: 0,
            read_skip_count: 0,
            process_skip_count: 0,
            write_skip_count: 0,
            commit_count: 0,
            rollback_count: 0,
            start_time: Utc::now(),
            end_time: None,
            failures: Vec::new(),
            execution_context: ExecutionContext::new(),
            terminate_only: false,
        }
    }

    /// Merge a committed contribution into the totals
    pub fn apply(&mut self, contribution: &StepContribution) {
        self.read_count += contribution.read_count;
        self.write_count += contribution.write_count;
        self.filter_count += contribution.filter_count;
        self.apply_skips(contribution);
    }

    /// Merge only the skip counts of a rolled back contribution
    pub fn apply_skips(&mut self, contribution: &StepContribution) {
        self.read_skip_count += contribution.read_skip_count;
        self.process_skip_count += contribution.process_skip_count;
        self.write_skip_count += contribution.write_skip_count;
    }

    pub fn increment_commit_count(&mut self) {
        self.commit_count += 1;
    }

    pub fn increment_rollback_count(&mut self) {
        self.rollback_count += 1;
    }

    /// Total skips across all phases
    pub fn skip_count(&self) -> usize {
        self.read_skip_count + self.process_skip_count + self.write_skip_count
    }

    /// Request a stop at the next chunk boundary
    pub fn set_terminate_only(&mut self) {
        self.terminate_only = true;
    }

    pub fn mark_started(&mut self) {
        self.start_time = Utc::now();
        self.status = BatchStatus::Started;
    }

    /// Record a terminal status and the end time
    pub fn finish(&mut self, status: BatchStatus) {
        self.status = status;
        self.end_time = Some(Utc::now());
    }

    pub fn add_failure(&mut self, message: impl Into<String>) {
        self.failures.push(message.into());
    }

    /// Duration of the run if it finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Log the execution summary
    pub fn log_summary(&self) {
        tracing::info!(
            step = %self.step_name,
            status = %self.status,
            read = self.read_count,
            written = self.write_count,
            filtered = self.filter_count,
            read_skips = self.read_skip_count,
            process_skips = self.process_skip_count,
            write_skips = self.write_skip_count,
            commits = self.commit_count,
            rollbacks = self.rollback_count,
            duration_ms = self.duration().map(|d| d.num_milliseconds()).unwrap_or(0),
            "Step finished"
        );

        for failure in &self.failures {
            tracing::warn!(step = %self.step_name, failure = %failure, "Step failure");
        }
    }
}
