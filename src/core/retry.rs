//! Stateful composite retry
//!
//! A batched write covers many items that share one outcome. The
//! [`RetryCoordinator`] keeps one [`RetryContext`] per item key in a bounded
//! cache and evaluates an attempt against all of them at once:
//!
//! - the attempt may run only while **every** key is still within its policy
//! - a failure is registered against **every** key of the attempt
//! - a success clears every key of the attempt
//! - once the keys are exhausted the caller's recovery runs instead
//!
//! Contexts outlive the transaction that created them, so a chunk rolled back
//! and replayed is recognised by the content keys of its items.
//!
//! Registering a batch failure against every key means an item that shared a
//! batch with a chronically failing one keeps that failure count, even though
//! it never failed on its own. It can later be recovered (and skipped) without
//! a failure of its own.

use crate::core::listener::RetryListener;
use crate::core::policy::{BackOffPolicy, RetryPolicy};
use crate::domain::{BatchError, ItemKey, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static ERROR_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Identity of one item across transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetryState {
    key: ItemKey,
}

impl RetryState {
    pub fn new(key: ItemKey) -> Self {
        Self { key }
    }

    /// State keyed by the content of an item
    pub fn of<T: Hash + ?Sized>(item: &T) -> Self {
        Self::new(ItemKey::of(item))
    }

    pub fn key(&self) -> ItemKey {
        self.key
    }
}

impl From<ItemKey> for RetryState {
    fn from(key: ItemKey) -> Self {
        Self::new(key)
    }
}

/// Failure history of one item key
#[derive(Debug, Clone, PartialEq)]
pub struct RetryContext {
    key: ItemKey,
    retry_count: u32,
    last_error: Option<BatchError>,
    sequence: u64,
}

impl RetryContext {
    pub fn new(key: ItemKey) -> Self {
        Self {
            key,
            retry_count: 0,
            last_error: None,
            sequence: 0,
        }
    }

    pub fn key(&self) -> ItemKey {
        self.key
    }

    /// Failed attempts so far
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_error(&self) -> Option<&BatchError> {
        self.last_error.as_ref()
    }

    pub fn register_error(&mut self, error: BatchError) {
        self.retry_count += 1;
        self.last_error = Some(error);
        self.sequence = ERROR_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    }
}

/// One attempt spanning several item keys
#[derive(Debug, Clone, Default)]
pub struct CompositeRetryContext {
    contexts: Vec<RetryContext>,
}

impl CompositeRetryContext {
    pub fn new(contexts: Vec<RetryContext>) -> Self {
        Self { contexts }
    }

    /// Highest failure count among the children
    pub fn retry_count(&self) -> u32 {
        self.contexts
            .iter()
            .map(RetryContext::retry_count)
            .max()
            .unwrap_or(0)
    }

    /// Most recently registered error among the children
    pub fn last_error(&self) -> Option<&BatchError> {
        self.contexts
            .iter()
            .filter(|c| c.last_error.is_some())
            .max_by_key(|c| c.sequence)
            .and_then(RetryContext::last_error)
    }

    /// Whether every child permits another attempt
    pub fn can_retry(&self, policy: &dyn RetryPolicy) -> bool {
        self.contexts.iter().all(|c| policy.can_retry(c))
    }

    /// Whether any child has failed before
    pub fn has_failed(&self) -> bool {
        self.contexts.iter().any(|c| c.last_error.is_some())
    }

    pub fn contexts(&self) -> &[RetryContext] {
        &self.contexts
    }

    pub fn into_contexts(self) -> Vec<RetryContext> {
        self.contexts
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

/// Bounded map of retry contexts keyed by item
#[derive(Debug)]
pub struct RetryContextCache {
    capacity: usize,
    contexts: Mutex<HashMap<ItemKey, RetryContext>>,
}

impl RetryContextCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: ItemKey) -> Option<RetryContext> {
        self.contexts.lock().get(&key).cloned()
    }

    /// Insert or replace a context
    ///
    /// # Errors
    ///
    /// Returns `BatchError::RetryCacheCapacityExceeded` when a new key would
    /// grow the cache past its capacity.
    pub fn put(&self, context: RetryContext) -> Result<()> {
        let mut contexts = self.contexts.lock();
        if !contexts.contains_key(&context.key) && contexts.len() >= self.capacity {
            return Err(BatchError::RetryCacheCapacityExceeded(self.capacity));
        }
        contexts.insert(context.key, context);
        Ok(())
    }

    pub fn remove(&self, key: ItemKey) -> Option<RetryContext> {
        self.contexts.lock().remove(&key)
    }

    pub fn contains(&self, key: ItemKey) -> bool {
        self.contexts.lock().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }
}

/// Executes operations under a composite retry state
pub struct RetryCoordinator {
    cache: RetryContextCache,
    policy: Arc<dyn RetryPolicy>,
    backoff: Arc<dyn BackOffPolicy>,
    listeners: Vec<Arc<dyn RetryListener>>,
}

impl RetryCoordinator {
    pub fn new(
        policy: Arc<dyn RetryPolicy>,
        backoff: Arc<dyn BackOffPolicy>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            cache: RetryContextCache::new(cache_capacity),
            policy,
            backoff,
            listeners: Vec::new(),
        }
    }

    pub fn with_listeners(mut self, listeners: Vec<Arc<dyn RetryListener>>) -> Self {
        self.listeners = listeners;
        self
    }

    pub fn policy(&self) -> &dyn RetryPolicy {
        self.policy.as_ref()
    }

    /// Run `operation` for the given keys, or `recovery` once they are exhausted
    ///
    /// On failure the error is registered against every key, back-off is applied
    /// when another attempt is allowed, and the error is returned so the caller
    /// can roll back. The next call with the same keys either retries or hands
    /// the exhausted contexts to `recovery`.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, the recovery's error, a listener error, or
    /// `BatchError::RetryCacheCapacityExceeded`.
    pub async fn execute<R, Op, OpFut, Rec, RecFut>(
        &self,
        states: &[RetryState],
        operation: Op,
        recovery: Rec,
    ) -> Result<R>
    where
        Op: FnOnce() -> OpFut,
        OpFut: Future<Output = Result<R>>,
        Rec: FnOnce(CompositeRetryContext) -> RecFut,
        RecFut: Future<Output = Result<R>>,
    {
        let composite = self.open(states);

        if self.exhausted(&composite) {
            tracing::debug!(
                keys = states.len(),
                retry_count = composite.retry_count(),
                "Retry exhausted, running recovery"
            );
            for listener in &self.listeners {
                listener.on_recover(&composite)?;
            }
            return recovery(composite).await;
        }

        match operation().await {
            Ok(value) => {
                self.clear(states);
                Ok(value)
            }
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                let composite = self.register(states, &error)?;
                for listener in &self.listeners {
                    listener.on_error(&composite, &error)?;
                }

                if composite.can_retry(self.policy.as_ref()) {
                    let delay = self.backoff.delay(composite.retry_count());
                    crate::log_retry_attempt!(
                        states.len(),
                        composite.retry_count(),
                        self.policy.max_attempts(),
                        delay.as_millis() as u64,
                        &error
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(error)
            }
        }
    }

    /// Current contexts of the given keys, fresh ones for unknown keys
    pub fn open(&self, states: &[RetryState]) -> CompositeRetryContext {
        let contexts = distinct(states)
            .into_iter()
            .map(|s| {
                self.cache
                    .get(s.key())
                    .unwrap_or_else(|| RetryContext::new(s.key()))
            })
            .collect();
        CompositeRetryContext::new(contexts)
    }

    /// Register one failure against every key
    ///
    /// Equal items share a key, which is counted once per attempt.
    pub fn register(&self, states: &[RetryState], error: &BatchError) -> Result<CompositeRetryContext> {
        let states = distinct(states);
        let mut contexts = Vec::with_capacity(states.len());
        for state in states {
            let mut context = self
                .cache
                .get(state.key())
                .unwrap_or_else(|| RetryContext::new(state.key()));
            context.register_error(error.clone());
            self.cache.put(context.clone())?;
            contexts.push(context);
        }
        Ok(CompositeRetryContext::new(contexts))
    }

    /// Forget the failure history of every key
    pub fn clear(&self, states: &[RetryState]) {
        for state in states {
            self.cache.remove(state.key());
        }
    }

    /// Whether the keys can no longer be retried
    pub fn is_exhausted(&self, states: &[RetryState]) -> bool {
        self.exhausted(&self.open(states))
    }

    fn exhausted(&self, composite: &CompositeRetryContext) -> bool {
        composite.has_failed() && !composite.can_retry(self.policy.as_ref())
    }

    pub fn context(&self, key: ItemKey) -> Option<RetryContext> {
        self.cache.get(key)
    }

    pub fn cached_keys(&self) -> usize {
        self.cache.len()
    }
}

/// Keys of an attempt in first-seen order, duplicates dropped
fn distinct(states: &[RetryState]) -> Vec<&RetryState> {
    let mut seen = HashSet::with_capacity(states.len());
    states.iter().filter(|s| seen.insert(s.key())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::{NoBackOffPolicy, SimpleRetryPolicy};
    use crate::domain::ErrorKind;

    fn coordinator(max_attempts: u32) -> RetryCoordinator {
        RetryCoordinator::new(
            Arc::new(SimpleRetryPolicy::new(max_attempts, [ErrorKind::Write])),
            Arc::new(NoBackOffPolicy),
            64,
        )
    }

    fn states(items: &[&str]) -> Vec<RetryState> {
        items.iter().map(|i| RetryState::of(*i)).collect()
    }

    fn write_error() -> BatchError {
        BatchError::Write("batch rejected".to_string())
    }

    #[test]
    fn test_composite_aggregates_children() {
        let mut a = RetryContext::new(ItemKey::from(1));
        let mut b = RetryContext::new(ItemKey::from(2));
        a.register_error(BatchError::Write("first".into()));
        a.register_error(BatchError::Write("second".into()));
        b.register_error(BatchError::Write("latest".into()));

        let composite = CompositeRetryContext::new(vec![a, b]);
        assert_eq!(composite.retry_count(), 2);
        assert_eq!(
            composite.last_error(),
            Some(&BatchError::Write("latest".into()))
        );
        assert!(composite.has_failed());
    }

    #[test]
    fn test_composite_can_retry_requires_every_child() {
        let policy = SimpleRetryPolicy::new(2, [ErrorKind::Write]);
        let mut fresh = RetryContext::new(ItemKey::from(1));
        let mut exhausted = RetryContext::new(ItemKey::from(2));
        exhausted.register_error(write_error());
        exhausted.register_error(write_error());

        let all_exhausted = CompositeRetryContext::new(vec![exhausted.clone(), exhausted.clone()]);
        assert!(!all_exhausted.can_retry(&policy));

        fresh.register_error(write_error());
        let all_within = CompositeRetryContext::new(vec![fresh.clone(), fresh.clone()]);
        assert!(all_within.can_retry(&policy));

        let mixed = CompositeRetryContext::new(vec![fresh, exhausted]);
        assert!(!mixed.can_retry(&policy));
    }

    #[test]
    fn test_cache_capacity() {
        let cache = RetryContextCache::new(1);
        cache.put(RetryContext::new(ItemKey::from(1))).unwrap();
        // replacing an existing key is fine
        cache.put(RetryContext::new(ItemKey::from(1))).unwrap();

        let err = cache.put(RetryContext::new(ItemKey::from(2))).unwrap_err();
        assert_eq!(err, BatchError::RetryCacheCapacityExceeded(1));
    }

    #[tokio::test]
    async fn test_failure_is_registered_against_every_key() {
        let coordinator = coordinator(3);
        let keys = states(&["a", "b", "c"]);

        let result: Result<()> = coordinator
            .execute(&keys, || async { Err(write_error()) }, |_| async { Ok(()) })
            .await;

        assert!(result.is_err());
        for state in &keys {
            assert_eq!(coordinator.context(state.key()).unwrap().retry_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_equal_items_count_one_failure_per_attempt() {
        let coordinator = coordinator(2);
        let keys = states(&["x", "x", "y"]);

        let result: Result<()> = coordinator
            .execute(&keys, || async { Err(write_error()) }, |_| async { Ok(()) })
            .await;

        assert!(result.is_err());
        let x = coordinator.context(keys[0].key()).unwrap();
        assert_eq!(x.retry_count(), 1);
        assert_eq!(coordinator.open(&keys).retry_count(), 1);
        assert!(!coordinator.is_exhausted(&keys));

        // the second failure exhausts both keys
        let _: Result<()> = coordinator
            .execute(&keys, || async { Err(write_error()) }, |_| async { Ok(()) })
            .await;
        assert_eq!(coordinator.context(keys[0].key()).unwrap().retry_count(), 2);
        assert!(coordinator.is_exhausted(&keys));
    }

    #[tokio::test]
    async fn test_success_clears_every_key() {
        let coordinator = coordinator(3);
        let keys = states(&["a", "b"]);
        coordinator.register(&keys, &write_error()).unwrap();

        let result = coordinator
            .execute(&keys, || async { Ok(7) }, |_| async { Ok(0) })
            .await
            .unwrap();

        assert_eq!(result, 7);
        assert_eq!(coordinator.cached_keys(), 0);
    }

    #[tokio::test]
    async fn test_recovery_runs_once_exhausted() {
        let coordinator = coordinator(2);
        let keys = states(&["a", "b"]);

        for _ in 0..2 {
            let _: Result<&str> = coordinator
                .execute(&keys, || async { Err(write_error()) }, |_| async {
                    Ok("recovered")
                })
                .await;
        }
        assert!(coordinator.is_exhausted(&keys));

        let mut operation_ran = false;
        let outcome = coordinator
            .execute(
                &keys,
                || {
                    operation_ran = true;
                    async { Ok("written") }
                },
                |composite| async move {
                    assert_eq!(composite.len(), 2);
                    Ok("recovered")
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome, "recovered");
        assert!(!operation_ran);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_registered() {
        let coordinator = coordinator(3);
        let keys = states(&["a"]);

        let result: Result<()> = coordinator
            .execute(
                &keys,
                || async { Err(BatchError::Listener("listener failed".into())) },
                |_| async { Ok(()) },
            )
            .await;

        assert!(matches!(result, Err(BatchError::Listener(_))));
        assert_eq!(coordinator.cached_keys(), 0);
    }

    /// Known trade-off: an item that only ever shared a batch with a failing
    /// item is exhausted along with it.
    #[tokio::test]
    async fn test_innocent_key_keeps_stale_failure_count() {
        let coordinator = coordinator(2);
        let batch = states(&["innocent", "culprit"]);

        for _ in 0..2 {
            let _: Result<()> = coordinator
                .execute(&batch, || async { Err(write_error()) }, |_| async { Ok(()) })
                .await;
        }

        // the culprit is isolated and cleared on its own, the innocent is not
        coordinator.clear(&states(&["culprit"]));

        let innocent = states(&["innocent"]);
        assert!(coordinator.is_exhausted(&innocent));
        let recovered = coordinator
            .execute(&innocent, || async { Ok(false) }, |_| async { Ok(true) })
            .await
            .unwrap();
        assert!(recovered, "innocent item goes straight to recovery");
    }
}
