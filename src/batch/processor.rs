//! Batch Processor Module
//!
//! Fetches per-entity data for many ids with bounded concurrency, retry with
//! exponential backoff, and per-entity failure isolation.

use std::collections::HashSet;
use std::future::Future;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::batch::{BatchOptions, BatchResult};
use crate::cancel::CancelSignal;
use crate::error::{BatchError, FetchError};

/// Terminal state of one entity within a run.
enum EntityOutcome<T> {
    Succeeded(T),
    Failed(FetchError),
    Cancelled,
}

// == Batch Processor ==
/// Runs a per-entity fetch over a list of ids.
///
/// Ids are de-duplicated and split into chunks of `batch_size`. A single
/// semaphore bounds simultaneous attempts to `max_concurrent` for the whole
/// run; permits are held only while an attempt runs, never across a backoff
/// sleep. Each chunk settles completely before the `batch_interval` pause
/// that precedes the next one.
#[derive(Debug, Clone, Default)]
pub struct BatchProcessor {
    options: BatchOptions,
}

impl BatchProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: BatchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    // == Process All ==
    /// Fetches every id and partitions the outcomes.
    ///
    /// Entity failures are reported in `failed`, never as an error; only
    /// invalid options are rejected.
    pub async fn process_all<I, S, T, F, Fut>(
        &self,
        ids: I,
        fetch: F,
    ) -> Result<BatchResult<T>, BatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        self.process_all_with_cancel(ids, fetch, &CancelSignal::never())
            .await
    }

    /// Like [`process_all`](Self::process_all), but stops early once
    /// `cancel` fires. In-flight attempts, backoff sleeps and the pause
    /// between chunks are all interrupted; ids without a terminal outcome
    /// are reported in `cancelled`.
    pub async fn process_all_with_cancel<I, S, T, F, Fut>(
        &self,
        ids: I,
        fetch: F,
        cancel: &CancelSignal,
    ) -> Result<BatchResult<T>, BatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let options = &self.options;
        options.validate()?;

        let started = Instant::now();
        let ids = dedupe(ids);
        let mut result = BatchResult::new();
        if ids.is_empty() {
            return Ok(result);
        }

        let semaphore = Semaphore::new(options.max_concurrent);
        let chunk_count = ids.len().div_ceil(options.batch_size);
        info!(
            ids = ids.len(),
            chunks = chunk_count,
            max_concurrent = options.max_concurrent,
            "batch run started"
        );

        for (index, chunk) in ids.chunks(options.batch_size).enumerate() {
            if cancel.is_cancelled() {
                result.cancelled.extend(chunk.iter().cloned());
                continue;
            }

            debug!(
                chunk = index + 1,
                of = chunk_count,
                size = chunk.len(),
                "dispatching chunk"
            );
            let outcomes = join_all(
                chunk
                    .iter()
                    .map(|id| self.run_entity(id, &fetch, &semaphore, cancel)),
            )
            .await;

            for (id, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    EntityOutcome::Succeeded(value) => {
                        result.successful.insert(id.clone(), value);
                    }
                    EntityOutcome::Failed(err) => {
                        result.failed.insert(id.clone(), err);
                    }
                    EntityOutcome::Cancelled => result.cancelled.push(id.clone()),
                }
            }

            let is_last = index + 1 == chunk_count;
            if !is_last && !options.batch_interval.is_zero() {
                debug!(delay = ?options.batch_interval, "throttling before next chunk");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(options.batch_interval) => {}
                }
            }
        }

        result.processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            successful = result.successful.len(),
            failed = result.failed.len(),
            cancelled = result.cancelled.len(),
            elapsed_ms = result.processing_time_ms,
            "batch run completed"
        );
        Ok(result)
    }

    async fn run_entity<T, F, Fut>(
        &self,
        id: &str,
        fetch: &F,
        semaphore: &Semaphore,
        cancel: &CancelSignal,
    ) -> EntityOutcome<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let options = &self.options;
        let mut last_error = FetchError::Internal("no attempt was made".to_string());

        for attempt in 0..=options.retry_attempts {
            if attempt > 0 {
                let delay = options.retry_delay(attempt);
                warn!(id, attempt, ?delay, error = %last_error, "retrying entity");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return EntityOutcome::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return EntityOutcome::Cancelled,
                outcome = self.attempt(id, fetch, semaphore) => outcome,
            };

            match outcome {
                Ok(value) => return EntityOutcome::Succeeded(value),
                Err(FetchError::Cancelled) => return EntityOutcome::Cancelled,
                Err(err) => last_error = err,
            }
        }

        warn!(
            id,
            attempts = options.retry_attempts + 1,
            error = %last_error,
            "entity failed, retries exhausted"
        );
        EntityOutcome::Failed(last_error)
    }

    async fn attempt<T, F, Fut>(
        &self,
        id: &str,
        fetch: &F,
        semaphore: &Semaphore,
    ) -> Result<T, FetchError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::Internal("concurrency limiter closed".to_string()))?;

        match self.options.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch(id.to_string()))
                .await
                .unwrap_or(Err(FetchError::Timeout(limit))),
            None => fetch(id.to_string()).await,
        }
    }
}

/// Drops repeated ids, keeping the first occurrence and input order.
fn dedupe<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    ids.into_iter()
        .map(Into::into)
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn fast_options() -> BatchOptions {
        BatchOptions {
            batch_interval: Duration::ZERO,
            base_delay: Duration::from_millis(10),
            ..BatchOptions::default()
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence_order() {
        assert_eq!(dedupe(["B", "A", "B", "C", "A"]), ids(&["B", "A", "C"]));
    }

    #[tokio::test]
    async fn test_empty_ids_return_immediately() {
        let processor = BatchProcessor::new();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let result = processor
            .process_all(Vec::<String>::new(), move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, FetchError>(())
            })
            .await
            .unwrap();

        assert_eq!(result.total(), 0);
        assert_eq!(result.processing_time_ms, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_entity_is_isolated() {
        let processor = BatchProcessor::with_options(fast_options());

        let result = processor
            .process_all(["A", "B", "C"], |id| async move {
                if id == "B" {
                    Err(FetchError::upstream("member not found"))
                } else {
                    Ok(format!("news for {id}"))
                }
            })
            .await
            .unwrap();

        assert_eq!(result.successful.len(), 2);
        assert_eq!(result.successful["A"], "news for A");
        assert_eq!(result.successful["C"], "news for C");
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed["B"], FetchError::upstream("member not found"));
        assert_eq!(result.successful.len() + result.failed.len(), 3);
        assert!(result.cancelled.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_ids_are_fetched_once() {
        let processor = BatchProcessor::with_options(fast_options());
        let calls = Arc::new(Mutex::new(HashMap::<String, usize>::new()));

        let result = processor
            .process_all(["A", "A", "B", "A"], |id| {
                let calls = Arc::clone(&calls);
                async move {
                    *calls.lock().unwrap().entry(id.clone()).or_default() += 1;
                    Ok::<_, FetchError>(id)
                }
            })
            .await
            .unwrap();

        assert_eq!(result.total(), 2);
        let calls = calls.lock().unwrap();
        assert_eq!(calls["A"], 1);
        assert_eq!(calls["B"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_succeed() {
        let options = fast_options();
        let retry_attempts = options.retry_attempts as usize;
        let processor = BatchProcessor::with_options(options);
        let attempts = AtomicUsize::new(0);

        // fails on every attempt but the final one
        let result = processor
            .process_all(["S000148"], |_| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt <= retry_attempts {
                        Err(FetchError::Status {
                            status: 429,
                            url: "https://api.fec.gov".into(),
                        })
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result.successful.get("S000148"), Some(&(retry_attempts + 1)));
        assert!(result.failed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_keep_last_error() {
        let processor = BatchProcessor::with_options(fast_options());
        let attempts = AtomicUsize::new(0);

        let result = processor
            .process_all(["X"], |_| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    Err::<(), _>(FetchError::upstream(format!("attempt {attempt}")))
                }
            })
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(result.failed["X"], FetchError::upstream("attempt 4"));
        assert!(result.successful.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_are_exponential() {
        let processor = BatchProcessor::with_options(BatchOptions {
            batch_interval: Duration::ZERO,
            base_delay: Duration::from_millis(100),
            ..BatchOptions::default()
        });

        let result = processor
            .process_all(["X"], |_| async {
                Err::<(), _>(FetchError::upstream("down"))
            })
            .await
            .unwrap();

        // 200ms + 400ms + 800ms
        assert_eq!(result.processing_time_ms, 1_400);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_ceiling_is_respected() {
        let processor = BatchProcessor::with_options(BatchOptions {
            batch_size: 10,
            max_concurrent: 3,
            batch_interval: Duration::from_millis(50),
            ..BatchOptions::default()
        });
        let in_flight = AtomicUsize::new(0);
        let max_seen = AtomicUsize::new(0);
        let (current, peak) = (&in_flight, &max_seen);
        let all: Vec<String> = (0..40).map(|i| format!("member-{i}")).collect();

        let result = processor
            .process_all(all, move |id| {
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, FetchError>(id)
                }
            })
            .await
            .unwrap();

        assert_eq!(result.successful.len(), 40);
        assert_eq!(max_seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_interval_between_chunks_only() {
        let processor = BatchProcessor::with_options(BatchOptions {
            batch_size: 2,
            batch_interval: Duration::from_secs(2),
            ..BatchOptions::default()
        });

        let result = processor
            .process_all(["a", "b", "c", "d", "e"], |id| async move {
                Ok::<_, FetchError>(id)
            })
            .await
            .unwrap();

        // three chunks, two pauses
        assert_eq!(result.processing_time_ms, 4_000);
        assert_eq!(result.successful.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_failure() {
        let processor = BatchProcessor::with_options(BatchOptions {
            retry_attempts: 1,
            attempt_timeout: Some(Duration::from_secs(1)),
            ..fast_options()
        });

        let result = processor
            .process_all(["slow"], |_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, FetchError>(())
            })
            .await
            .unwrap();

        assert_eq!(
            result.failed["slow"],
            FetchError::Timeout(Duration::from_secs(1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_interval_marks_remaining_chunks() {
        let processor = BatchProcessor::with_options(BatchOptions {
            batch_size: 2,
            batch_interval: Duration::from_secs(10),
            ..BatchOptions::default()
        });
        let (handle, signal) = cancel_pair();

        let fetch = |id: String| async move { Ok::<_, FetchError>(id) };
        let run = processor.process_all_with_cancel(["a", "b", "c", "d"], fetch, &signal);
        let cancel = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(run, cancel);
        let result = result.unwrap();

        assert_eq!(result.successful.len(), 2);
        assert_eq!(result.cancelled, ids(&["c", "d"]));
        assert_eq!(result.total(), 4);
        assert_eq!(result.processing_time_ms, 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_in_flight_and_backoff() {
        let processor = BatchProcessor::with_options(BatchOptions {
            max_concurrent: 1,
            ..BatchOptions::default()
        });
        let (handle, signal) = cancel_pair();

        let fetch = |id: String| async move {
            match id.as_str() {
                "ok" => Ok(()),
                "flaky" => Err(FetchError::upstream("503")),
                _ => {
                    tokio::time::sleep(Duration::from_secs(3_600)).await;
                    Ok(())
                }
            }
        };
        let run = processor.process_all_with_cancel(["ok", "flaky", "slow"], fetch, &signal);
        let cancel = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(run, cancel);
        let result = result.unwrap();

        assert!(result.successful.contains_key("ok"));
        assert!(result.cancelled.contains(&"flaky".to_string()));
        assert!(result.cancelled.contains(&"slow".to_string()));
        assert!(result.failed.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_options_are_rejected_before_work() {
        let processor = BatchProcessor::with_options(BatchOptions {
            max_concurrent: 0,
            ..BatchOptions::default()
        });
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let result = processor
            .process_all(["A"], move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, FetchError>(())
            })
            .await;

        assert!(matches!(result, Err(BatchError::InvalidOptions(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_concurrency_is_an_error_not_a_panic() {
        let processor = BatchProcessor::with_options(BatchOptions {
            max_concurrent: usize::MAX,
            ..BatchOptions::default()
        });

        let result = processor
            .process_all(["A"], |id| async move { Ok::<_, FetchError>(id) })
            .await;

        assert!(matches!(result, Err(BatchError::InvalidOptions(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // Every de-duplicated id ends up in exactly one partition.
        #[test]
        fn prop_batch_completeness(
            input in prop::collection::vec("[a-j]", 0..40),
            failing in prop::collection::hash_set("[a-j]", 0..10),
            batch_size in 1usize..8,
            max_concurrent in 1usize..6,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap();
            let processor = BatchProcessor::with_options(BatchOptions {
                batch_size,
                max_concurrent,
                retry_attempts: 1,
                ..fast_options()
            });

            let result = rt.block_on(processor.process_all(input.clone(), |id| {
                let fails = failing.contains(&id);
                async move {
                    if fails {
                        Err(FetchError::upstream(id))
                    } else {
                        Ok(id)
                    }
                }
            })).unwrap();

            let deduped: HashSet<String> = input.into_iter().collect();
            prop_assert_eq!(result.successful.len() + result.failed.len(), deduped.len());
            for id in &deduped {
                let in_success = result.successful.contains_key(id);
                let in_failed = result.failed.contains_key(id);
                prop_assert!(in_success != in_failed, "id {} must be in exactly one map", id);
                prop_assert_eq!(in_failed, failing.contains(id));
            }
        }
    }
}
