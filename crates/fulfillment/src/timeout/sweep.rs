//! Periodic reconciliation of expired unpaid orders.

use std::sync::Arc;
use std::time::Duration;

use common::Clock;
use store::Store;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::orders::OrderService;
use crate::{FulfillmentError, Result};

/// Cancels orders that stayed unpaid past the timeout, whether or not their
/// cancellation task still exists.
pub struct ReconciliationSweep<S: Store + Clone> {
    orders: OrderService<S>,
    clock: Arc<dyn Clock>,
    timeout: chrono::Duration,
    interval: Duration,
    batch_size: i64,
}

impl<S: Store + Clone> ReconciliationSweep<S> {
    pub fn new(orders: OrderService<S>) -> Result<Self> {
        let config = orders.config();
        let timeout = chrono::Duration::from_std(config.order_timeout)
            .map_err(|e| FulfillmentError::Validation(format!("order timeout: {e}")))?;
        Ok(Self {
            clock: orders.clock().clone(),
            timeout,
            interval: config.sweep_interval,
            batch_size: config.sweep_batch_size,
            orders,
        })
    }

    /// One pass over the expired orders. Returns how many were cancelled.
    ///
    /// Failures on single orders are logged and skipped; the next pass
    /// retries them.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<usize> {
        let deadline = self.clock.now() - self.timeout;
        let expired = self
            .orders
            .store()
            .expired_pending_orders(deadline, self.batch_size)
            .await?;
        if expired.is_empty() {
            return Ok(0);
        }

        let mut cancelled = 0;
        for order in &expired {
            match self.orders.cancel_timeout_order(order.id).await {
                Ok(true) => cancelled += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(
                    order_id = %order.id,
                    order_number = %order.order_number,
                    error = %e,
                    "sweep could not cancel order"
                ),
            }
        }

        metrics::counter!("order_timeout_sweep_cancelled_total").increment(cancelled as u64);
        tracing::info!(found = expired.len(), cancelled, "reconciliation sweep done");
        Ok(cancelled)
    }

    /// Sweeps once immediately, then every interval, until `shutdown`.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval = ?self.interval, "order reconciliation sweep started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "reconciliation sweep failed");
                    }
                }
            }
        }

        tracing::info!("order reconciliation sweep stopped");
    }
}
