//! Tunables of the fulfillment core.

use std::time::Duration;

/// Retry policy of the optimistic stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockRetryPolicy {
    /// Total conditional-update attempts, the first one included.
    pub max_attempts: u32,
    /// Pause before the second attempt; doubles after every further loss.
    pub base_backoff: Duration,
}

impl StockRetryPolicy {
    /// Pause after the failed attempt number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for StockRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(50),
        }
    }
}

/// Settings shared by the order services and the timeout workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentConfig {
    /// How long an order may stay unpaid.
    pub order_timeout: Duration,
    pub stock_retry: StockRetryPolicy,
    /// Delay of the second delete of a delayed double delete.
    pub cache_delay_delete: Duration,
    pub product_cache_ttl: Duration,
    pub cart_cache_ttl: Duration,
    /// Period of the reconciliation sweep.
    pub sweep_interval: Duration,
    /// Orders cancelled per sweep pass at most.
    pub sweep_batch_size: i64,
    /// Longest a consumer poll blocks before it re-checks for shutdown.
    pub consumer_poll_wait: Duration,
    /// Currency all prices are stored in.
    pub currency: String,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            order_timeout: Duration::from_secs(15 * 60),
            stock_retry: StockRetryPolicy::default(),
            cache_delay_delete: Duration::from_millis(500),
            product_cache_ttl: Duration::from_secs(30 * 60),
            cart_cache_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
            sweep_batch_size: 100,
            consumer_poll_wait: Duration::from_secs(1),
            currency: "CNY".to_string(),
        }
    }
}
