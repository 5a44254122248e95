//! Fluent construction of a [`ChunkStep`]

use super::{ChunkMonitor, ChunkStep, InterruptionPolicy};
use crate::adapters::progress::InMemoryProgressStore;
use crate::adapters::traits::{
    IsolationLevel, ItemProcessor, ItemReader, ItemWriter, ProgressStore, TransactionAttributes,
    TransactionManager,
};
use crate::adapters::transaction::ResourcelessTransactionManager;
use crate::config::{StepConfig, TransactionConfig};
use crate::core::listener::{
    ChunkListener, ItemProcessListener, ItemReadListener, ItemWriteListener, Listeners,
    RetryListener, SkipListener, StepListener,
};
use crate::core::policy::{
    BackOffPolicy, ExponentialBackOffPolicy, LimitCheckingSkipPolicy, NeverRetryPolicy,
    NeverSkipPolicy, NoBackOffPolicy, RetryPolicy, SimpleRetryPolicy, SkipPolicy,
};
use crate::core::processor::{ChunkProcessor, FaultTolerance, ScanMode};
use crate::core::provider::ChunkProvider;
use crate::core::retry::RetryCoordinator;
use crate::domain::{BatchError, Result, StepName};
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const DEFAULT_RETRY_CACHE_CAPACITY: usize = 4096;

/// Builder for [`ChunkStep`]
///
/// # Example
///
/// ```no_run
/// use chunkwise::adapters::memory::{InMemoryItemReader, InMemoryItemWriter};
/// use chunkwise::adapters::processors::Uppercase;
/// use chunkwise::core::step::StepBuilder;
/// use chunkwise::domain::StepName;
///
/// # async fn example() -> chunkwise::domain::Result<()> {
/// let writer = InMemoryItemWriter::new();
/// let mut step = StepBuilder::new(StepName::new("shout").unwrap())
///     .chunk_size(2)
///     .reader(InMemoryItemReader::new(vec!["a".to_string(), "b".to_string()]))
///     .processor(Uppercase)
///     .writer(writer.clone())
///     .build()?;
///
/// let execution = step.execute().await?;
/// assert_eq!(writer.committed(), vec!["A", "B"]);
/// # Ok(())
/// # }
/// ```
pub struct StepBuilder<I, O> {
    name: StepName,
    chunk_size: usize,
    reader: Option<Box<dyn ItemReader<I>>>,
    processor: Option<Arc<dyn ItemProcessor<I, O>>>,
    writer: Option<Box<dyn ItemWriter<O>>>,
    fault_tolerant: bool,
    retry_policy: Arc<dyn RetryPolicy>,
    back_off_policy: Arc<dyn BackOffPolicy>,
    read_skip_policy: Arc<dyn SkipPolicy>,
    process_skip_policy: Arc<dyn SkipPolicy>,
    write_skip_policy: Arc<dyn SkipPolicy>,
    retry_cache_capacity: usize,
    buffering: bool,
    concurrency: usize,
    scan_mode: ScanMode,
    transaction_manager: Arc<dyn TransactionManager>,
    transaction_attributes: TransactionAttributes,
    progress_store: Arc<dyn ProgressStore>,
    listeners: Listeners<I, O>,
    interruption: InterruptionPolicy,
}

impl<I, O> StepBuilder<I, O>
where
    I: Clone + Hash + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    pub fn new(name: StepName) -> Self {
        let transaction_attributes = TransactionAttributes::new(name.as_str());
        Self {
            name,
            chunk_size: 1,
            reader: None,
            processor: None,
            writer: None,
            fault_tolerant: false,
            retry_policy: Arc::new(NeverRetryPolicy),
            back_off_policy: Arc::new(NoBackOffPolicy),
            read_skip_policy: Arc::new(NeverSkipPolicy),
            process_skip_policy: Arc::new(NeverSkipPolicy),
            write_skip_policy: Arc::new(NeverSkipPolicy),
            retry_cache_capacity: DEFAULT_RETRY_CACHE_CAPACITY,
            buffering: true,
            concurrency: 1,
            scan_mode: ScanMode::ItemByItem,
            transaction_manager: Arc::new(ResourcelessTransactionManager::new()),
            transaction_attributes,
            progress_store: Arc::new(InMemoryProgressStore::new()),
            listeners: Listeners::new(),
            interruption: InterruptionPolicy::new(),
        }
    }

    /// Items per transaction
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn reader(mut self, reader: impl ItemReader<I> + 'static) -> Self {
        self.reader = Some(Box::new(reader));
        self
    }

    pub fn processor(mut self, processor: impl ItemProcessor<I, O> + 'static) -> Self {
        self.processor = Some(Arc::new(processor));
        self
    }

    pub fn shared_processor(mut self, processor: Arc<dyn ItemProcessor<I, O>>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn writer(mut self, writer: impl ItemWriter<O> + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Enable retry and skip handling
    pub fn fault_tolerant(mut self) -> Self {
        self.fault_tolerant = true;
        self
    }

    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn back_off_policy(mut self, policy: Arc<dyn BackOffPolicy>) -> Self {
        self.back_off_policy = policy;
        self
    }

    /// Use one skip policy for read, process and write failures
    pub fn skip_policy(mut self, policy: Arc<dyn SkipPolicy>) -> Self {
        self.read_skip_policy = Arc::clone(&policy);
        self.process_skip_policy = Arc::clone(&policy);
        self.write_skip_policy = policy;
        self
    }

    pub fn read_skip_policy(mut self, policy: Arc<dyn SkipPolicy>) -> Self {
        self.read_skip_policy = policy;
        self
    }

    pub fn process_skip_policy(mut self, policy: Arc<dyn SkipPolicy>) -> Self {
        self.process_skip_policy = policy;
        self
    }

    pub fn write_skip_policy(mut self, policy: Arc<dyn SkipPolicy>) -> Self {
        self.write_skip_policy = policy;
        self
    }

    pub fn retry_cache_capacity(mut self, capacity: usize) -> Self {
        self.retry_cache_capacity = capacity;
        self
    }

    /// Keep the chunk in memory across rollbacks (default `true`)
    pub fn buffering(mut self, buffering: bool) -> Self {
        self.buffering = buffering;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn scan_mode(mut self, scan_mode: ScanMode) -> Self {
        self.scan_mode = scan_mode;
        self
    }

    pub fn transaction_manager(mut self, manager: Arc<dyn TransactionManager>) -> Self {
        self.transaction_manager = manager;
        self
    }

    pub fn transaction_attributes(mut self, attributes: TransactionAttributes) -> Self {
        self.transaction_attributes = attributes;
        self
    }

    pub fn progress_store(mut self, store: Arc<dyn ProgressStore>) -> Self {
        self.progress_store = store;
        self
    }

    /// Stop at the next chunk boundary once `signal` turns `true`
    pub fn shutdown_signal(mut self, signal: watch::Receiver<bool>) -> Self {
        self.interruption = InterruptionPolicy::with_signal(signal);
        self
    }

    pub fn step_listener(mut self, listener: Arc<dyn StepListener>) -> Self {
        self.listeners.add_step_listener(listener);
        self
    }

    pub fn chunk_listener(mut self, listener: Arc<dyn ChunkListener>) -> Self {
        self.listeners.add_chunk_listener(listener);
        self
    }

    pub fn read_listener(mut self, listener: Arc<dyn ItemReadListener<I>>) -> Self {
        self.listeners.add_read_listener(listener);
        self
    }

    pub fn process_listener(mut self, listener: Arc<dyn ItemProcessListener<I, O>>) -> Self {
        self.listeners.add_process_listener(listener);
        self
    }

    pub fn write_listener(mut self, listener: Arc<dyn ItemWriteListener<O>>) -> Self {
        self.listeners.add_write_listener(listener);
        self
    }

    pub fn skip_listener(mut self, listener: Arc<dyn SkipListener<I, O>>) -> Self {
        self.listeners.add_skip_listener(listener);
        self
    }

    pub fn retry_listener(mut self, listener: Arc<dyn RetryListener>) -> Self {
        self.listeners.add_retry_listener(listener);
        self
    }

    /// Apply the `[step]` section of the configuration
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Configuration` for an unknown scan mode or error kind.
    pub fn apply_config(mut self, config: &StepConfig) -> Result<Self> {
        self.chunk_size = config.chunk_size;
        self.buffering = config.buffering;
        self.concurrency = config.concurrency;
        self.retry_cache_capacity = config.retry_cache_capacity;
        self.scan_mode = config.scan_mode().map_err(BatchError::Configuration)?;

        if config.fault_tolerant {
            self.fault_tolerant = true;

            let retry = &config.retry;
            let retryable = retry.retryable_kinds().map_err(BatchError::Configuration)?;
            self.retry_policy = Arc::new(SimpleRetryPolicy::new(retry.max_attempts, retryable));
            self.back_off_policy = if retry.initial_delay_ms == 0 {
                Arc::new(NoBackOffPolicy)
            } else {
                Arc::new(
                    ExponentialBackOffPolicy::new(
                        Duration::from_millis(retry.initial_delay_ms),
                        Duration::from_millis(retry.max_delay_ms),
                        retry.backoff_multiplier,
                    )
                    .with_jitter(retry.jitter),
                )
            };

            let skippable = config
                .skip
                .skippable_kinds()
                .map_err(BatchError::Configuration)?;
            self = self.skip_policy(Arc::new(LimitCheckingSkipPolicy::new(
                config.skip.limit,
                skippable,
            )));
        }
        Ok(self)
    }

    /// Apply the `[transaction]` section of the configuration
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Configuration` for an unknown isolation level.
    pub fn apply_transaction_config(mut self, config: &TransactionConfig) -> Result<Self> {
        let isolation =
            IsolationLevel::from_str(&config.isolation).map_err(BatchError::Configuration)?;
        let mut attributes =
            TransactionAttributes::new(self.name.as_str()).with_isolation(isolation);
        if config.timeout_seconds > 0 {
            attributes = attributes.with_timeout(Duration::from_secs(config.timeout_seconds));
        }
        self.transaction_attributes = attributes;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `BatchError::Configuration` when a reader, processor or writer is
    /// missing, the chunk size is zero, or bisection is combined with
    /// concurrency or without buffering.
    pub fn build(self) -> Result<ChunkStep<I, O>> {
        if self.chunk_size == 0 {
            return Err(BatchError::Configuration(
                "chunk_size must be > 0".to_string(),
            ));
        }
        let reader = self.reader.ok_or_else(|| {
            BatchError::Configuration(format!("step '{}' has no reader", self.name))
        })?;
        let processor = self.processor.ok_or_else(|| {
            BatchError::Configuration(format!("step '{}' has no processor", self.name))
        })?;
        let writer = self.writer.ok_or_else(|| {
            BatchError::Configuration(format!("step '{}' has no writer", self.name))
        })?;

        if self.scan_mode == ScanMode::Bisect && self.concurrency > 1 {
            return Err(BatchError::Configuration(
                "bisection scan cannot be combined with concurrent processing".to_string(),
            ));
        }
        if self.scan_mode == ScanMode::Bisect && !self.buffering {
            return Err(BatchError::Configuration(
                "bisection scan requires buffering".to_string(),
            ));
        }

        let (provider, processor) = if self.fault_tolerant {
            let retry = RetryCoordinator::new(
                self.retry_policy,
                self.back_off_policy,
                self.retry_cache_capacity,
            )
            .with_listeners(self.listeners.retry_listeners());
            let fault_tolerance = FaultTolerance {
                retry,
                process_skip_policy: self.process_skip_policy,
                write_skip_policy: self.write_skip_policy,
            };
            (
                ChunkProvider::fault_tolerant(self.chunk_size, self.read_skip_policy),
                ChunkProcessor::fault_tolerant(processor, fault_tolerance),
            )
        } else {
            (
                ChunkProvider::simple(self.chunk_size),
                ChunkProcessor::simple(processor),
            )
        };

        let processor = processor
            .with_buffering(self.buffering)
            .with_concurrency(self.concurrency)
            .with_scan_mode(self.scan_mode);

        Ok(ChunkStep {
            name: self.name,
            reader,
            writer,
            provider,
            processor,
            transaction_manager: self.transaction_manager,
            transaction_attributes: self.transaction_attributes,
            progress_store: self.progress_store,
            listeners: self.listeners,
            interruption: self.interruption,
            monitor: ChunkMonitor::new(),
            buffering: self.buffering,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryItemReader, InMemoryItemWriter};
    use crate::adapters::processors::Identity;
    use crate::config::{RetryConfig, SkipConfig};

    fn builder() -> StepBuilder<String, String> {
        StepBuilder::new(StepName::new("builder-test").unwrap())
            .reader(InMemoryItemReader::new(vec!["a".to_string()]))
            .processor(Identity)
            .writer(InMemoryItemWriter::new())
    }

    #[test]
    fn test_build_requires_positive_chunk_size() {
        let result = builder().chunk_size(0).build();
        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }

    #[test]
    fn test_build_requires_writer() {
        let result = StepBuilder::<String, String>::new(StepName::new("no-writer").unwrap())
            .reader(InMemoryItemReader::new(vec![]))
            .processor(Identity)
            .build();
        assert!(matches!(result, Err(BatchError::Configuration(msg)) if msg.contains("writer")));
    }

    #[test]
    fn test_bisect_rejected_with_concurrency() {
        let result = builder()
            .scan_mode(ScanMode::Bisect)
            .concurrency(4)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_config() {
        let config = StepConfig {
            name: "configured".to_string(),
            chunk_size: 7,
            fault_tolerant: true,
            buffering: true,
            concurrency: 1,
            scan_mode: "bisect".to_string(),
            retry_cache_capacity: 16,
            retry: RetryConfig::default(),
            skip: SkipConfig::default(),
        };

        let step = builder().apply_config(&config).unwrap().build().unwrap();
        assert_eq!(step.chunk_size(), 7);
        assert!(step.processor.is_fault_tolerant());
    }

    #[test]
    fn test_apply_transaction_config() {
        let config = TransactionConfig {
            timeout_seconds: 30,
            isolation: "serializable".to_string(),
        };
        let builder = builder().apply_transaction_config(&config).unwrap();
        assert_eq!(builder.transaction_attributes.isolation, IsolationLevel::Serializable);
        assert_eq!(builder.transaction_attributes.timeout, Some(Duration::from_secs(30)));
    }
}
