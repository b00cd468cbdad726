//! Cache-aside read models.

mod cart;
mod product_detail;

pub use cart::{CartItemView, CartSummary, CartView};
pub use product_detail::{ProductDetail, ProductDetailView};

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{CacheBackend, Result};

/// Returns the cached value under `key`, or loads it and repopulates the cache.
///
/// Cache faults and undecodable entries count as misses. Only a failing
/// `load` is returned as an error. `None` results are not cached.
pub(crate) async fn read_through<T, F, Fut>(
    cache: &dyn CacheBackend,
    view: &'static str,
    key: &str,
    ttl: Duration,
    load: F,
) -> Result<Option<T>>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    match cache.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => {
                metrics::counter!("cache_hits_total", "view" => view).increment(1);
                tracing::debug!(key, "cache hit");
                return Ok(Some(value));
            }
            Err(e) => tracing::warn!(key, error = %e, "discarding undecodable cache entry"),
        },
        Ok(None) => {}
        Err(e) => {
            metrics::counter!("cache_faults_total").increment(1);
            tracing::warn!(key, error = %e, "cache read failed, falling back to store");
        }
    }

    metrics::counter!("cache_misses_total", "view" => view).increment(1);
    tracing::debug!(key, "cache miss");

    let Some(value) = load().await? else {
        return Ok(None);
    };
    match serde_json::to_string(&value) {
        Ok(raw) => {
            if let Err(e) = cache.set(key, raw, ttl).await {
                metrics::counter!("cache_faults_total").increment(1);
                tracing::warn!(key, error = %e, "cache write failed");
            }
        }
        Err(e) => tracing::warn!(key, error = %e, "could not encode view for cache"),
    }
    Ok(Some(value))
}
