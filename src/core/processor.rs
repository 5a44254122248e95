//! Chunk processor
//!
//! Transforms a provided chunk and writes the surviving items. In simple mode
//! any failure discards the chunk and fails the step. In fault tolerant mode:
//!
//! - **Transform** runs each item under its own retry state. A failure rolls the
//!   chunk back and marks it busy so it is processed again in the next
//!   transaction. Once the item's retries are exhausted the process skip policy
//!   either drops it or escalates.
//! - **Write** runs the whole chunk under a composite retry state. When retries
//!   are exhausted the chunk is scanned to find the items the sink rejects.
//!
//! With buffering the chunk survives rollback and the scan runs one probe per
//! transaction, either item by item or by bisection. Without buffering the
//! reader replays the chunk after a rollback, so the scan writes item by item
//! inside a single transaction, and items skipped in a rolled back attempt are
//! dropped when they come around again.

use crate::adapters::traits::{ItemProcessor, ItemWriter};
use crate::core::chunk::Chunk;
use crate::core::concurrent::ConcurrentChunkExecutor;
use crate::core::listener::{Listeners, SkipEvent};
use crate::core::policy::SkipPolicy;
use crate::core::retry::{CompositeRetryContext, RetryCoordinator, RetryState};
use crate::domain::{BatchError, ItemKey, Result, StepContribution};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// How a chunk is scanned once its write retries are exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Write one item per probe
    #[default]
    ItemByItem,
    /// Halve the failing range on every failed probe
    Bisect,
}

impl std::str::FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "item_by_item" | "item" => Ok(ScanMode::ItemByItem),
            "bisect" => Ok(ScanMode::Bisect),
            _ => Err(format!(
                "scan_mode must be 'item_by_item' or 'bisect' (got '{s}')"
            )),
        }
    }
}

/// A processed item with the input it came from
#[derive(Debug, Clone)]
pub struct Transformed<I, O> {
    pub input: I,
    pub output: O,
    pub state: RetryState,
}

/// Bookkeeping of the chunk in flight
///
/// Kept across rollback when buffering, so a retried chunk reuses its inputs
/// and, once the transform succeeded, its outputs.
#[derive(Debug)]
pub struct ChunkState<I, O> {
    inputs: Chunk<I>,
    outputs: Option<Chunk<Transformed<I, O>>>,
    original_size: usize,
    filter_count: usize,
    filter_reported: bool,
    scanning: bool,
    resolved: bool,
    carried_reads: usize,
}

impl<I, O> ChunkState<I, O> {
    pub fn new(inputs: Chunk<I>) -> Self {
        let original_size = inputs.len();
        Self {
            inputs,
            outputs: None,
            original_size,
            filter_count: 0,
            filter_reported: false,
            scanning: false,
            resolved: false,
            carried_reads: 0,
        }
    }

    pub fn inputs(&self) -> &Chunk<I> {
        &self.inputs
    }

    pub fn inputs_mut(&mut self) -> &mut Chunk<I> {
        &mut self.inputs
    }

    pub fn outputs(&self) -> Option<&Chunk<Transformed<I, O>>> {
        self.outputs.as_ref()
    }

    /// Items read for this chunk, before filtering and skips
    pub fn original_size(&self) -> usize {
        self.original_size
    }

    pub fn filter_count(&self) -> usize {
        self.filter_count
    }

    /// Whether the chunk must be carried into the next transaction
    pub fn is_busy(&self) -> bool {
        self.inputs.is_busy()
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.inputs.set_busy(busy);
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Whether the source ran dry while this chunk was read
    pub fn is_end(&self) -> bool {
        self.inputs.is_end()
    }

    /// Read ordinal of the first input not yet written or skipped
    ///
    /// Only set while a scan is part way through the chunk.
    pub fn first_unresolved_ordinal(&self) -> Option<usize> {
        if !self.scanning || self.resolved {
            return None;
        }
        self.outputs
            .as_ref()
            .and_then(Chunk::first_unresolved_ordinal)
    }

    /// Keep the read count of a rolled back attempt for the next commit
    pub fn carry_reads(&mut self, reads: usize) {
        self.carried_reads += reads;
    }

    pub fn take_carried_reads(&mut self) -> usize {
        std::mem::take(&mut self.carried_reads)
    }
}

/// Retry and skip configuration of a fault tolerant processor
pub struct FaultTolerance {
    pub retry: RetryCoordinator,
    pub process_skip_policy: Arc<dyn SkipPolicy>,
    pub write_skip_policy: Arc<dyn SkipPolicy>,
}

/// Skips recorded since the last commit
struct SkipLedger<I, O> {
    skipped: HashMap<ItemKey, usize>,
    events: Vec<SkipEvent<I, O>>,
}

impl<I, O> SkipLedger<I, O> {
    fn new() -> Self {
        Self {
            skipped: HashMap::new(),
            events: Vec::new(),
        }
    }

    fn record(&mut self, key: ItemKey, event: SkipEvent<I, O>) {
        *self.skipped.entry(key).or_insert(0) += 1;
        self.events.push(event);
    }
}

enum ItemOutcome<O> {
    Processed(O),
    Filtered,
    Exhausted(BatchError),
}

enum WriteOutcome {
    Written,
    Scan(BatchError),
}

pub struct ChunkProcessor<I, O> {
    processor: Arc<dyn ItemProcessor<I, O>>,
    fault_tolerance: Option<FaultTolerance>,
    executor: Option<ConcurrentChunkExecutor>,
    buffering: bool,
    scan_mode: ScanMode,
    ledger: SkipLedger<I, O>,
}

impl<I, O> ChunkProcessor<I, O>
where
    I: Clone + Hash + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    /// Processor without retry or skip
    pub fn simple(processor: Arc<dyn ItemProcessor<I, O>>) -> Self {
        Self {
            processor,
            fault_tolerance: None,
            executor: None,
            buffering: true,
            scan_mode: ScanMode::ItemByItem,
            ledger: SkipLedger::new(),
        }
    }

    pub fn fault_tolerant(processor: Arc<dyn ItemProcessor<I, O>>, fault_tolerance: FaultTolerance) -> Self {
        Self {
            fault_tolerance: Some(fault_tolerance),
            ..Self::simple(processor)
        }
    }

    pub fn with_buffering(mut self, buffering: bool) -> Self {
        self.buffering = buffering;
        self
    }

    /// Transform items on a worker pool when `concurrency > 1`
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.executor = (concurrency > 1).then(|| ConcurrentChunkExecutor::new(concurrency));
        self
    }

    pub fn with_scan_mode(mut self, scan_mode: ScanMode) -> Self {
        self.scan_mode = scan_mode;
        self
    }

    pub fn is_fault_tolerant(&self) -> bool {
        self.fault_tolerance.is_some()
    }

    /// Transform and write the chunk in `state`
    ///
    /// # Errors
    ///
    /// Any error rolls the transaction back. The chunk is flagged busy when the
    /// step should carry on with it in a new transaction.
    pub async fn process(
        &mut self,
        writer: &mut dyn ItemWriter<O>,
        contribution: &mut StepContribution,
        state: &mut ChunkState<I, O>,
        listeners: &Listeners<I, O>,
    ) -> Result<()> {
        state.set_busy(false);

        if state.outputs.is_none() {
            let outputs = self.transform(contribution, state, listeners).await?;
            state.outputs = Some(outputs);
        }

        self.write(writer, contribution, state, listeners).await?;

        if !state.filter_reported {
            contribution.increment_filter_count(state.filter_count);
            state.filter_reported = true;
        }
        Ok(())
    }

    /// Report skips to skip listeners once their transaction committed
    pub fn post_process(&mut self, listeners: &Listeners<I, O>) -> Result<()> {
        self.ledger.skipped.clear();
        for event in std::mem::take(&mut self.ledger.events) {
            listeners.on_skip(&event)?;
        }
        Ok(())
    }

    async fn transform(
        &mut self,
        contribution: &mut StepContribution,
        state: &mut ChunkState<I, O>,
        listeners: &Listeners<I, O>,
    ) -> Result<Chunk<Transformed<I, O>>> {
        state.filter_count = 0;
        if !self.buffering {
            self.drop_skipped(&mut state.inputs);
        }

        if let Some(executor) = self.executor.clone() {
            return self.transform_concurrently(&executor, state, listeners).await;
        }

        let entries: Vec<(I, usize)> = state
            .inputs
            .iter_with_ordinals()
            .map(|(item, ordinal)| (item.clone(), ordinal))
            .collect();

        let mut outputs = Chunk::new();
        let mut input_index = 0;

        for (item, ordinal) in entries {
            let retry_state = RetryState::of(&item);
            let processor = self.processor.as_ref();
            let current = &item;

            let outcome = match &self.fault_tolerance {
                None => process_item(processor, current, listeners).await,
                Some(ft) => {
                    ft.retry
                        .execute(
                            &[retry_state],
                            move || process_item(processor, current, listeners),
                            |composite| async move {
                                Ok(ItemOutcome::Exhausted(last_error_of(&composite)))
                            },
                        )
                        .await
                }
            };

            match outcome {
                Ok(ItemOutcome::Processed(output)) => {
                    outputs.add_with_ordinal(
                        Transformed {
                            state: write_state(&item),
                            input: item,
                            output,
                        },
                        ordinal,
                    );
                    input_index += 1;
                }
                Ok(ItemOutcome::Filtered) => {
                    state.filter_count += 1;
                    input_index += 1;
                }
                Ok(ItemOutcome::Exhausted(error)) => {
                    self.skip_in_process(contribution, item, retry_state, error)?;
                    state.inputs.remove(input_index);
                }
                Err(error) => {
                    if self.fault_tolerance.is_some() && !error.is_fatal() {
                        state.set_busy(true);
                    }
                    return Err(error);
                }
            }
        }

        tracing::trace!(
            inputs = state.original_size,
            outputs = outputs.len(),
            filtered = state.filter_count,
            "Chunk transformed"
        );
        Ok(outputs)
    }

    async fn transform_concurrently(
        &mut self,
        executor: &ConcurrentChunkExecutor,
        state: &mut ChunkState<I, O>,
        listeners: &Listeners<I, O>,
    ) -> Result<Chunk<Transformed<I, O>>> {
        let entries: Vec<(I, usize)> = state
            .inputs
            .iter_with_ordinals()
            .map(|(item, ordinal)| (item.clone(), ordinal))
            .collect();

        for (item, _) in &entries {
            listeners.before_process(item)?;
        }

        let items = entries.iter().map(|(item, _)| item.clone()).collect();
        let results = match executor.transform(items, Arc::clone(&self.processor)).await {
            Ok(results) => results,
            Err(failure) => {
                if let Some((item, _)) = entries.get(failure.index) {
                    listeners.on_process_error(item, &failure.error)?;
                }
                return Err(failure.error);
            }
        };

        let mut outputs = Chunk::new();
        for ((item, ordinal), result) in entries.into_iter().zip(results) {
            listeners.after_process(&item, result.as_ref())?;
            match result {
                Some(output) => {
                    outputs.add_with_ordinal(
                        Transformed {
                            state: write_state(&item),
                            input: item,
                            output,
                        },
                        ordinal,
                    );
                }
                None => state.filter_count += 1,
            }
        }
        Ok(outputs)
    }

    /// Drop replayed items that were skipped in a rolled back attempt
    fn drop_skipped(&self, inputs: &mut Chunk<I>) {
        if self.ledger.skipped.is_empty() {
            return;
        }
        let mut remaining = self.ledger.skipped.clone();
        let mut index = 0;
        while index < inputs.len() {
            let key = ItemKey::of(&inputs.all_items()[index]);
            match remaining.get_mut(&key) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    inputs.remove(index);
                }
                _ => index += 1,
            }
        }
    }

    fn skip_in_process(
        &mut self,
        contribution: &mut StepContribution,
        item: I,
        retry_state: RetryState,
        error: BatchError,
    ) -> Result<()> {
        let Some(ft) = &self.fault_tolerance else {
            return Err(error);
        };
        if !ft
            .process_skip_policy
            .should_skip(&error, contribution.step_skip_count())?
        {
            return Err(error);
        }

        contribution.increment_process_skip_count();
        crate::log_skip!("process", &error, contribution.step_skip_count());
        ft.retry.clear(&[retry_state]);
        self.ledger
            .record(retry_state.key(), SkipEvent::Process(item, error));
        Ok(())
    }

    async fn write(
        &mut self,
        writer: &mut dyn ItemWriter<O>,
        contribution: &mut StepContribution,
        state: &mut ChunkState<I, O>,
        listeners: &Listeners<I, O>,
    ) -> Result<()> {
        if state.resolved {
            return Ok(());
        }
        let Some(outputs) = state.outputs.as_mut() else {
            return Ok(());
        };

        let Some(ft) = self.fault_tolerance.as_ref() else {
            let items: Vec<O> = outputs.all_items().iter().map(|t| t.output.clone()).collect();
            if !items.is_empty() {
                write_items(writer, &items, listeners).await?;
                contribution.increment_write_count(items.len());
            }
            state.resolved = true;
            return Ok(());
        };

        if !state.scanning {
            let items: Vec<O> = outputs.all_items().iter().map(|t| t.output.clone()).collect();
            if items.is_empty() {
                state.resolved = true;
                return Ok(());
            }
            let states: Vec<RetryState> = outputs.all_items().iter().map(|t| t.state).collect();

            let target = &mut *writer;
            let batch = &items;
            let outcome = ft
                .retry
                .execute(
                    &states,
                    move || async move {
                        write_items(target, batch, listeners)
                            .await
                            .map(|_| WriteOutcome::Written)
                    },
                    |composite| async move { Ok(WriteOutcome::Scan(last_error_of(&composite))) },
                )
                .await;

            match outcome {
                Ok(WriteOutcome::Written) => {
                    contribution.increment_write_count(items.len());
                    state.resolved = true;
                    return Ok(());
                }
                Ok(WriteOutcome::Scan(error)) => {
                    tracing::info!(
                        items = items.len(),
                        mode = ?self.scan_mode,
                        buffering = self.buffering,
                        error = %error,
                        "Write retries exhausted, scanning chunk"
                    );
                    state.scanning = true;
                    if self.buffering && self.scan_mode == ScanMode::Bisect {
                        let _ = outputs.register_failure(error);
                    } else {
                        outputs.begin_scan(error);
                    }
                }
                Err(error) => {
                    if !error.is_fatal() {
                        state.inputs.set_busy(true);
                    }
                    return Err(error);
                }
            }
        }

        if self.buffering {
            self.scan_probe(writer, contribution, state, listeners).await
        } else {
            self.scan_all(writer, contribution, state, listeners).await
        }
    }

    /// One scan probe per transaction
    async fn scan_probe(
        &mut self,
        writer: &mut dyn ItemWriter<O>,
        contribution: &mut StepContribution,
        state: &mut ChunkState<I, O>,
        listeners: &Listeners<I, O>,
    ) -> Result<()> {
        let Some(ft) = self.fault_tolerance.as_ref() else {
            return Ok(());
        };
        let Some(outputs) = state.outputs.as_mut() else {
            return Ok(());
        };

        if self.scan_mode == ScanMode::ItemByItem {
            outputs.focus_single();
        }

        // suspect already failed alone in an earlier attempt
        if outputs.can_skip() {
            let resolved = skip_suspect(ft, &mut self.ledger, contribution, outputs)?;
            state.resolved = resolved;
            state.inputs.set_busy(!resolved);
            return Ok(());
        }

        let window: Vec<O> = outputs.items().iter().map(|t| t.output.clone()).collect();
        let states: Vec<RetryState> = outputs.items().iter().map(|t| t.state).collect();

        match write_items(writer, &window, listeners).await {
            Ok(()) => {
                contribution.increment_write_count(window.len());
                ft.retry.clear(&states);
                let resolved = outputs.complete_attempt().is_ok();
                tracing::debug!(written = window.len(), resolved, "Scan probe succeeded");
                state.resolved = resolved;
                state.inputs.set_busy(!resolved);
                Ok(())
            }
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                ft.retry.register(&states, &error)?;
                let error = outputs.register_failure(error);
                if outputs.can_skip() {
                    state.resolved = skip_suspect(ft, &mut self.ledger, contribution, outputs)?;
                }
                state.inputs.set_busy(true);
                Err(error)
            }
        }
    }

    /// Item by item scan of the whole chunk inside one transaction
    async fn scan_all(
        &mut self,
        writer: &mut dyn ItemWriter<O>,
        contribution: &mut StepContribution,
        state: &mut ChunkState<I, O>,
        listeners: &Listeners<I, O>,
    ) -> Result<()> {
        let Some(ft) = self.fault_tolerance.as_ref() else {
            return Ok(());
        };
        let entries: Vec<Transformed<I, O>> = match state.outputs.as_ref() {
            Some(outputs) => outputs.all_items().to_vec(),
            None => Vec::new(),
        };

        for entry in entries {
            let single = [entry.output.clone()];
            match write_items(writer, &single, listeners).await {
                Ok(()) => {
                    contribution.increment_write_count(1);
                    ft.retry.clear(&[entry.state]);
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    ft.retry.register(&[entry.state], &error)?;
                    if !ft
                        .write_skip_policy
                        .should_skip(&error, contribution.step_skip_count())?
                    {
                        return Err(error);
                    }
                    contribution.increment_write_skip_count();
                    crate::log_skip!("write", &error, contribution.step_skip_count());
                    ft.retry.clear(&[entry.state]);
                    self.ledger
                        .record(ItemKey::of(&entry.input), SkipEvent::Write(entry.output, error));
                }
            }
        }

        state.resolved = true;
        Ok(())
    }
}

/// Retry state of an item's write, kept apart from its transform state
fn write_state<I: Hash>(item: &I) -> RetryState {
    RetryState::of(&("write", item))
}

/// Take the isolated suspect out of `outputs`, if the write skip policy allows
///
/// Returns whether the chunk is now fully handled.
fn skip_suspect<I: Hash, O>(
    ft: &FaultTolerance,
    ledger: &mut SkipLedger<I, O>,
    contribution: &mut StepContribution,
    outputs: &mut Chunk<Transformed<I, O>>,
) -> Result<bool> {
    let error = outputs
        .pending_error()
        .cloned()
        .unwrap_or_else(|| BatchError::Write("write failed".to_string()));

    if !ft
        .write_skip_policy
        .should_skip(&error, contribution.step_skip_count())?
    {
        return Err(error);
    }

    let Some(suspect) = outputs.take_suspect_item() else {
        return Ok(false);
    };
    contribution.increment_write_skip_count();
    crate::log_skip!("write", &error, contribution.step_skip_count());
    ft.retry.clear(&[suspect.state]);
    ledger.record(ItemKey::of(&suspect.input), SkipEvent::Write(suspect.output, error));

    Ok(outputs.complete_attempt().is_ok())
}

async fn process_item<I, O>(
    processor: &dyn ItemProcessor<I, O>,
    item: &I,
    listeners: &Listeners<I, O>,
) -> Result<ItemOutcome<O>>
where
    I: Send + Sync,
    O: Send,
{
    listeners.before_process(item)?;
    match processor.process(item).await {
        Ok(Some(output)) => {
            listeners.after_process(item, Some(&output))?;
            Ok(ItemOutcome::Processed(output))
        }
        Ok(None) => {
            listeners.after_process(item, None)?;
            Ok(ItemOutcome::Filtered)
        }
        Err(error) => {
            listeners.on_process_error(item, &error)?;
            Err(error)
        }
    }
}

async fn write_items<I, O>(
    writer: &mut dyn ItemWriter<O>,
    items: &[O],
    listeners: &Listeners<I, O>,
) -> Result<()>
where
    O: Send + Sync,
{
    listeners.before_write(items)?;
    match writer.write(items).await {
        Ok(()) => listeners.after_write(items),
        Err(error) => {
            listeners.on_write_error(items, &error)?;
            Err(error)
        }
    }
}

fn last_error_of(composite: &CompositeRetryContext) -> BatchError {
    composite
        .last_error()
        .cloned()
        .unwrap_or_else(|| BatchError::Other("retry exhausted".to_string()))
}
