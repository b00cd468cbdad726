//! Delayed double delete.
//!
//! A mutation of rows backing a cached view runs as
//! `guard(keys)` → write → `finish()`: the first delete stops readers from
//! repopulating with pre-write data; the second, fired after `delay`, clears
//! anything a reader cached while the write was in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::CacheBackend;

/// Issues immediate and delayed cache deletes.
///
/// Delayed deletes run on a tracked background task. They never block the
/// caller; after [`CacheInvalidator::shutdown`] any that have not fired are
/// skipped, which costs at most a stale read until TTL.
#[derive(Clone)]
pub struct CacheInvalidator {
    backend: Arc<dyn CacheBackend>,
    delay: Duration,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl CacheInvalidator {
    pub fn new(backend: Arc<dyn CacheBackend>, delay: Duration) -> Self {
        Self {
            backend,
            delay,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Deletes `keys` now. Faults are logged and swallowed.
    pub async fn invalidate_now(&self, keys: &[String]) {
        delete_all(self.backend.as_ref(), keys).await;
    }

    /// Deletes `keys` again after the configured delay.
    pub fn schedule_delete(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        if self.shutdown.is_cancelled() {
            tracing::debug!(?keys, "invalidator shut down, skipping delayed delete");
            return;
        }

        let backend = self.backend.clone();
        let delay = self.delay;
        let shutdown = self.shutdown.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::debug!(?keys, "delayed delete skipped on shutdown");
                }
                () = tokio::time::sleep(delay) => {
                    delete_all(backend.as_ref(), &keys).await;
                    tracing::debug!(?keys, "delayed delete done");
                }
            }
        });
    }

    /// Performs the first delete and returns a guard for the second.
    ///
    /// Dropping the guard without [`InvalidationGuard::finish`] skips the
    /// second delete; do that only when the write did not happen.
    pub async fn guard(&self, keys: Vec<String>) -> InvalidationGuard {
        self.invalidate_now(&keys).await;
        InvalidationGuard {
            invalidator: self.clone(),
            keys,
        }
    }

    /// Number of delayed deletes still pending.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Stops accepting delayed deletes, cancels the pending ones and waits
    /// for their tasks to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn delete_all(backend: &dyn CacheBackend, keys: &[String]) {
    for key in keys {
        if let Err(e) = backend.delete(key).await {
            metrics::counter!("cache_faults_total").increment(1);
            tracing::warn!(key = %key, error = %e, "cache delete failed");
        }
    }
}

/// Second half of a delayed double delete.
#[must_use = "call finish() after the write so the delayed delete is scheduled"]
pub struct InvalidationGuard {
    invalidator: CacheInvalidator,
    keys: Vec<String>,
}

impl InvalidationGuard {
    /// Schedules the delayed second delete.
    pub fn finish(self) {
        self.invalidator.schedule_delete(self.keys);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryCache;

    const TTL: Duration = Duration::from_secs(1800);

    fn setup() -> (InMemoryCache, CacheInvalidator) {
        let cache = InMemoryCache::new();
        let invalidator =
            CacheInvalidator::new(Arc::new(cache.clone()), Duration::from_millis(500));
        (cache, invalidator)
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_delete_clears_stale_repopulation() {
        let (cache, invalidator) = setup();
        cache.set("product:1", "old".to_string(), TTL).await.unwrap();

        let guard = invalidator.guard(vec!["product:1".to_string()]).await;
        assert!(!cache.contains("product:1").await);

        // A reader that loaded before the write lands repopulates the old value.
        cache.set("product:1", "old".to_string(), TTL).await.unwrap();
        guard.finish();
        assert!(cache.contains("product:1").await);

        tokio::time::sleep(Duration::from_millis(501)).await;
        assert!(!cache.contains("product:1").await);
        assert_eq!(invalidator.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_for_delay() {
        let (cache, invalidator) = setup();
        invalidator.schedule_delete(vec!["cart:1".to_string()]);
        cache.set("cart:1", "v".to_string(), TTL).await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(cache.contains("cart:1").await);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!cache.contains("cart:1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_skips_pending_deletes() {
        let (cache, invalidator) = setup();
        cache.set("product:2", "v".to_string(), TTL).await.unwrap();
        invalidator.schedule_delete(vec!["product:2".to_string()]);
        assert_eq!(invalidator.pending(), 1);

        invalidator.shutdown().await;
        assert!(cache.contains("product:2").await);

        invalidator.schedule_delete(vec!["product:2".to_string()]);
        assert_eq!(invalidator.pending(), 0);
    }

    #[tokio::test]
    async fn test_faults_are_swallowed() {
        let (cache, invalidator) = setup();
        cache.set_unavailable(true);
        let guard = invalidator.guard(vec!["product:3".to_string()]).await;
        guard.finish();
        invalidator.shutdown().await;
    }
}
