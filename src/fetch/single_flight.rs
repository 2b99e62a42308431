//! Single-Flight Fetch Module
//!
//! Cache-aside wrapper that coalesces concurrent misses for the same key
//! into one producer call.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::SharedCache;
use crate::cancel::CancelSignal;
use crate::error::FetchError;

type FetchOutcome<V> = Result<V, FetchError>;
type Pending<V> = BoxFuture<'static, FetchOutcome<V>>;
type InFlight<V> = Shared<Pending<V>>;
type Registry<V> = Arc<Mutex<InFlightTable<V>>>;

/// Pending fetches by key. Entries only hold weak handles, so a fetch
/// nobody awaits any more is dropped along with its last waiter.
struct InFlightTable<V> {
    next_episode: u64,
    entries: HashMap<String, Registration<V>>,
}

struct Registration<V> {
    episode: u64,
    pending: WeakShared<Pending<V>>,
}

impl<V> Default for InFlightTable<V> {
    fn default() -> Self {
        Self {
            next_episode: 0,
            entries: HashMap::new(),
        }
    }
}

impl<V> InFlightTable<V> {
    fn join(&self, key: &str) -> Option<InFlight<V>> {
        self.entries.get(key).and_then(|r| r.pending.upgrade())
    }

    fn live_count(&self) -> usize {
        self.entries
            .values()
            .filter(|r| r.pending.upgrade().is_some())
            .count()
    }

    fn next_episode(&mut self) -> u64 {
        self.next_episode += 1;
        self.next_episode
    }
}

// == Cached Fetcher ==
/// Cache-aside fetcher with per-key request de-duplication.
///
/// For a given key the producer runs at most once per miss episode: callers
/// arriving while a fetch is pending join it instead of starting another.
/// Successful results are cached for the requested TTL; failures are never
/// cached and are broadcast unchanged to every waiter. The fetcher never
/// retries.
///
/// The producer runs on its own tokio task, so a waiter that gives up does
/// not stall the others.
pub struct CachedFetcher<V> {
    cache: SharedCache<V>,
    in_flight: Registry<V>,
    fetch_timeout: Option<Duration>,
}

impl<V> Clone for CachedFetcher<V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            in_flight: Arc::clone(&self.in_flight),
            fetch_timeout: self.fetch_timeout,
        }
    }
}

impl<V> fmt::Debug for CachedFetcher<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFetcher")
            .field("in_flight", &self.in_flight.lock().live_count())
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

enum Lookup<V> {
    Hit(V),
    Pending(InFlight<V>),
}

/// Removes the registry entry when the producer task settles, panics or is
/// aborted. A newer episode registered under the same key is left alone.
struct InFlightGuard<V> {
    registry: Registry<V>,
    key: String,
    episode: u64,
}

impl<V> Drop for InFlightGuard<V> {
    fn drop(&mut self) {
        let mut table = self.registry.lock();
        let current = table
            .entries
            .get(&self.key)
            .is_some_and(|r| r.episode == self.episode);
        if current {
            table.entries.remove(&self.key);
        }
    }
}

/// Aborts the producer task once the shared future awaiting it is dropped.
struct AbortOnDrop<T> {
    task: JoinHandle<T>,
    key: String,
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            debug!(key = %self.key, "no waiters left, aborting fetch");
            self.task.abort();
        }
    }
}

impl<V> CachedFetcher<V>
where
    V: Clone + Serialize + Send + Sync + 'static,
{
    pub fn new(cache: SharedCache<V>) -> Self {
        Self {
            cache,
            in_flight: Arc::default(),
            fetch_timeout: None,
        }
    }

    /// Bounds every producer call; a producer exceeding `timeout` settles as
    /// `FetchError::Timeout` for all of its waiters.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn cache(&self) -> &SharedCache<V> {
        &self.cache
    }

    /// Number of keys with a pending producer.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().live_count()
    }

    // == Fetch ==
    /// Returns the cached value for `key`, or runs `producer` once and caches
    /// its result for `ttl`.
    pub async fn fetch<F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> FetchOutcome<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchOutcome<V>> + Send + 'static,
    {
        match self.lookup_or_start(key, ttl, producer).await {
            Lookup::Hit(value) => Ok(value),
            Lookup::Pending(pending) => pending.await,
        }
    }

    /// Like [`fetch`](Self::fetch), but stops waiting with
    /// `FetchError::Cancelled` once `cancel` fires.
    ///
    /// Cancelling one waiter leaves the shared fetch running for the others.
    /// When the last waiter of a fetch is cancelled, the producer task is
    /// aborted, nothing is cached and the next call starts a fresh fetch.
    pub async fn fetch_with_cancel<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        cancel: &CancelSignal,
        producer: F,
    ) -> FetchOutcome<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchOutcome<V>> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let pending = match self.lookup_or_start(key, ttl, producer).await {
            Lookup::Hit(value) => return Ok(value),
            Lookup::Pending(pending) => pending,
        };

        tokio::select! {
            biased;
            outcome = pending => outcome,
            _ = cancel.cancelled() => {
                debug!(key, "caller stopped waiting for in-flight fetch");
                Err(FetchError::Cancelled)
            }
        }
    }

    // The cache lock is held across the registry check so that "miss, no
    // pending fetch, register" is one atomic step.
    async fn lookup_or_start<F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Lookup<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchOutcome<V>> + Send + 'static,
    {
        let mut cache = self.cache.write().await;
        if let Some(value) = cache.get(key) {
            debug!(key, "cache hit");
            return Lookup::Hit(value);
        }

        let mut in_flight = self.in_flight.lock();
        if let Some(pending) = in_flight.join(key) {
            debug!(key, "joining in-flight fetch");
            return Lookup::Pending(pending);
        }

        debug!(key, "cache miss, starting fetch");
        let episode = in_flight.next_episode();
        let pending = self.start(key.to_string(), ttl, episode, producer);
        if let Some(weak) = pending.downgrade() {
            let registration = Registration {
                episode,
                pending: weak,
            };
            in_flight.entries.insert(key.to_string(), registration);
        }
        Lookup::Pending(pending)
    }

    // The producer task is spawned on first poll of the shared future, which
    // always happens after both locks are released.
    fn start<F, Fut>(&self, key: String, ttl: Duration, episode: u64, producer: F) -> InFlight<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchOutcome<V>> + Send + 'static,
    {
        let registry = Arc::clone(&self.in_flight);
        let cache = Arc::clone(&self.cache);
        let timeout = self.fetch_timeout;

        async move {
            let task_key = key.clone();
            let task = tokio::spawn(async move {
                let _guard = InFlightGuard {
                    registry,
                    key: key.clone(),
                    episode,
                };

                let outcome = match timeout {
                    Some(limit) => tokio::time::timeout(limit, producer())
                        .await
                        .unwrap_or(Err(FetchError::Timeout(limit))),
                    None => producer().await,
                };

                match &outcome {
                    Ok(value) => cache.write().await.set(key.clone(), value.clone(), ttl),
                    Err(err) => warn!(key = %key, error = %err, "fetch failed, not caching"),
                }
                outcome
            });
            let mut task = AbortOnDrop {
                task,
                key: task_key,
            };

            (&mut task.task).await.unwrap_or_else(|join_err| {
                Err(FetchError::Internal(format!("fetch task failed: {join_err}")))
            })
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{self, CacheStore, ManualClock};
    use crate::cancel::cancel_pair;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);

    fn fetcher() -> CachedFetcher<String> {
        CachedFetcher::new(cache::shared(CacheStore::new(100)))
    }

    async fn never_called() -> FetchOutcome<String> {
        panic!("producer must not run")
    }

    #[tokio::test]
    async fn test_hit_skips_producer() {
        let fetcher = fetcher();
        fetcher
            .cache()
            .write()
            .await
            .set("k", "cached".to_string(), TTL);

        let value = fetcher.fetch("k", TTL, never_called).await;

        assert_eq!(value, Ok("cached".to_string()));
    }

    #[tokio::test]
    async fn test_miss_populates_cache() {
        let fetcher = fetcher();

        let value = fetcher
            .fetch("member:A000360", TTL, || async { Ok("Alexander".to_string()) })
            .await;

        assert_eq!(value, Ok("Alexander".to_string()));
        let mut cache = fetcher.cache().write().await;
        assert_eq!(cache.get("member:A000360"), Some("Alexander".to_string()));
        assert_eq!(fetcher.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_producer_call() {
        let fetcher = fetcher();
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..25).map(|_| {
            let calls = Arc::clone(&calls);
            let fetcher = fetcher.clone();
            async move {
                fetcher
                    .fetch("bill:hr1", TTL, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok("For the People Act".to_string())
                    })
                    .await
            }
        });
        let results = join_all(callers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results
            .iter()
            .all(|r| r.as_deref() == Ok("For the People Act")));
        assert_eq!(fetcher.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_failure() {
        let fetcher = fetcher();
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..10).map(|_| {
            let calls = Arc::clone(&calls);
            let fetcher = fetcher.clone();
            async move {
                fetcher
                    .fetch("k", TTL, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err(FetchError::Status {
                            status: 503,
                            url: "https://api.congress.gov/v3/member".into(),
                        })
                    })
                    .await
            }
        });
        let results = join_all(callers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = results[0].clone().unwrap_err();
        assert!(results.iter().all(|r| r.as_ref().unwrap_err() == &first));
    }

    #[tokio::test]
    async fn test_failed_fetch_is_never_cached() {
        let fetcher = fetcher();

        let result = fetcher
            .fetch("k", Duration::from_millis(1_000), || async {
                Err(FetchError::upstream("boom"))
            })
            .await;

        assert_eq!(result, Err(FetchError::upstream("boom")));
        assert_eq!(fetcher.cache().write().await.get("k"), None);
        assert_eq!(fetcher.in_flight_count(), 0);

        // a new miss episode runs the producer again
        let retry = fetcher
            .fetch("k", TTL, || async { Ok("ok".to_string()) })
            .await;
        assert_eq!(retry, Ok("ok".to_string()));
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_resurrected_on_failure() {
        let clock = ManualClock::new(0);
        let store = CacheStore::with_clock(10, Arc::new(clock.clone()));
        let fetcher: CachedFetcher<String> = CachedFetcher::new(cache::shared(store));

        fetcher
            .cache()
            .write()
            .await
            .set("k", "stale".to_string(), Duration::from_secs(1));
        clock.advance(Duration::from_secs(2));

        let result = fetcher
            .fetch("k", TTL, || async { Err(FetchError::upstream("down")) })
            .await;

        assert!(result.is_err());
        assert_eq!(fetcher.cache().write().await.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_settles_and_clears_registry() {
        let fetcher = fetcher().with_timeout(Duration::from_secs(1));

        let result = fetcher
            .fetch("slow", TTL, || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok("late".to_string())
            })
            .await;

        assert_eq!(result, Err(FetchError::Timeout(Duration::from_secs(1))));
        assert_eq!(fetcher.in_flight_count(), 0);
        assert!(!fetcher.cache().read().await.contains_live("slow"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_does_not_affect_others() {
        let fetcher = fetcher();
        let (handle, signal) = cancel_pair();

        let producer = || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, FetchError>("value".to_string())
        };
        let patient = fetcher.fetch("k", TTL, producer);
        let impatient = fetcher.fetch_with_cancel("k", TTL, &signal, never_called);
        let cancel = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.cancel();
        };

        let (patient, impatient, ()) = tokio::join!(patient, impatient, cancel);

        assert_eq!(impatient, Err(FetchError::Cancelled));
        assert_eq!(patient, Ok("value".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_waiter_leaving_aborts_producer() {
        let fetcher = fetcher();
        let (handle, signal) = cancel_pair();
        let completed = Arc::new(AtomicUsize::new(0));

        let done = Arc::clone(&completed);
        let waiter = fetcher.fetch_with_cancel("k", TTL, &signal, move || async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            done.fetch_add(1, Ordering::SeqCst);
            Ok::<_, FetchError>("value".to_string())
        });
        let cancel = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(waiter, cancel);
        assert_eq!(result, Err(FetchError::Cancelled));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 0);
        assert_eq!(fetcher.in_flight_count(), 0);
        assert!(!fetcher.cache().read().await.contains_live("k"));

        let value = fetcher
            .fetch("k", TTL, || async { Ok("fresh".to_string()) })
            .await;
        assert_eq!(value, Ok("fresh".to_string()));
    }

    #[tokio::test]
    async fn test_already_cancelled_signal_skips_work() {
        let fetcher = fetcher();
        let (handle, signal) = cancel_pair();
        handle.cancel();

        let result = fetcher
            .fetch_with_cancel("k", TTL, &signal, never_called)
            .await;

        tokio_test::assert_err!(result);
        assert_eq!(fetcher.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_producer_panic_is_internal_error() {
        let fetcher = fetcher();

        // panics inside the producer task surface as an internal error
        let result = fetcher.fetch("k", TTL, never_called).await;

        assert!(matches!(result, Err(FetchError::Internal(_))));
        assert_eq!(fetcher.in_flight_count(), 0);
    }
}
