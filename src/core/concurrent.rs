//! Concurrent item transform
//!
//! Items of one chunk are processed on a bounded pool of tokio tasks. Reading
//! and writing stay on the step loop; only the transform fans out. Results are
//! joined in submission order, so output order always matches read order.
//!
//! A failed item aborts the workers that have not been joined yet. Nothing is
//! retried or skipped here: the failure goes back to the step loop, which rolls
//! the chunk back.

use crate::adapters::traits::ItemProcessor;
use crate::domain::BatchError;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Failure of one item in a concurrent transform
#[derive(Debug, Clone, PartialEq)]
pub struct TransformFailure {
    /// Position of the failed item in the submitted batch
    pub index: usize,
    pub error: BatchError,
}

/// Bounded worker pool for the transform phase
#[derive(Debug, Clone)]
pub struct ConcurrentChunkExecutor {
    pool_size: usize,
    semaphore: Arc<Semaphore>,
}

impl ConcurrentChunkExecutor {
    pub fn new(pool_size: usize) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            pool_size,
            semaphore: Arc::new(Semaphore::new(pool_size)),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Transform `items` concurrently, preserving order
    ///
    /// # Returns
    ///
    /// One result per item, `None` for filtered items.
    ///
    /// # Errors
    ///
    /// Returns the first failure in submission order. Workers not yet joined
    /// are aborted and their results discarded.
    pub async fn transform<I, O>(
        &self,
        items: Vec<I>,
        processor: Arc<dyn ItemProcessor<I, O>>,
    ) -> std::result::Result<Vec<Option<O>>, TransformFailure>
    where
        I: Send + Sync + 'static,
        O: Send + 'static,
    {
        let mut handles: Vec<JoinHandle<crate::domain::Result<Option<O>>>> =
            Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    abort_all(&handles);
                    return Err(TransformFailure {
                        index,
                        error: BatchError::Other(format!("worker pool closed: {e}")),
                    });
                }
            };
            let processor = Arc::clone(&processor);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                processor.process(&item).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for index in 0..handles.len() {
            let joined = (&mut handles[index]).await;
            let outcome = match joined {
                Ok(result) => result,
                Err(e) => Err(BatchError::Process(format!("worker task failed: {e}"))),
            };

            match outcome {
                Ok(output) => results.push(output),
                Err(error) => {
                    abort_all(&handles[index + 1..]);
                    tracing::warn!(
                        index = index,
                        error = %error,
                        "Concurrent transform failed, abandoning remaining workers"
                    );
                    return Err(TransformFailure { index, error });
                }
            }
        }

        Ok(results)
    }
}

fn abort_all<T>(handles: &[JoinHandle<T>]) {
    for handle in handles {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Doubler;

    #[async_trait]
    impl ItemProcessor<u64, u64> for Doubler {
        async fn process(&self, item: &u64) -> Result<Option<u64>> {
            // later items finish first
            tokio::time::sleep(Duration::from_millis(40 - *item * 5)).await;
            Ok(Some(item * 2))
        }
    }

    struct Gauge {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ItemProcessor<u64, u64> for Gauge {
        async fn process(&self, item: &u64) -> Result<Option<u64>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(if item % 2 == 0 { Some(*item) } else { None })
        }
    }

    struct FailsOn(u64);

    #[async_trait]
    impl ItemProcessor<u64, u64> for FailsOn {
        async fn process(&self, item: &u64) -> Result<Option<u64>> {
            if *item == self.0 {
                Err(BatchError::Process(format!("cannot process {item}")))
            } else {
                Ok(Some(*item))
            }
        }
    }

    #[tokio::test]
    async fn test_results_joined_in_submission_order() {
        let executor = ConcurrentChunkExecutor::new(2);
        let processor: Arc<dyn ItemProcessor<u64, u64>> = Arc::new(Doubler);
        let results = executor
            .transform(vec![1, 2, 3, 4], processor)
            .await
            .unwrap();

        assert_eq!(results, vec![Some(2), Some(4), Some(6), Some(8)]);
    }

    #[tokio::test]
    async fn test_pool_size_bounds_concurrency() {
        let gauge = Arc::new(Gauge {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let executor = ConcurrentChunkExecutor::new(3);
        let processor: Arc<dyn ItemProcessor<u64, u64>> = gauge.clone();

        let results = executor
            .transform((0..12).collect(), processor)
            .await
            .unwrap();

        assert_eq!(results.iter().filter(|r| r.is_some()).count(), 6);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_first_failure_is_reported() {
        let executor = ConcurrentChunkExecutor::new(4);
        let processor: Arc<dyn ItemProcessor<u64, u64>> = Arc::new(FailsOn(3));
        let failure = executor
            .transform(vec![1, 2, 3, 4], processor)
            .await
            .unwrap_err();

        assert_eq!(failure.index, 2);
        assert!(matches!(failure.error, BatchError::Process(_)));
    }

    #[test]
    fn test_pool_size_at_least_one() {
        assert_eq!(ConcurrentChunkExecutor::new(0).pool_size(), 1);
    }
}
