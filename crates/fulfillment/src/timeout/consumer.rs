//! Worker that cancels orders whose timeout task came due.

use std::sync::Arc;
use std::time::Duration;

use store::Store;
use tokio_util::sync::CancellationToken;

use super::DelayQueue;
use crate::orders::OrderService;
use crate::Result;

/// Claims due cancellation tasks and runs the timeout cancellation for each.
///
/// Several consumers may share one queue; the queue hands every task to at
/// most one of them.
pub struct TimeoutConsumer<S: Store + Clone> {
    orders: OrderService<S>,
    queue: Arc<dyn DelayQueue>,
    poll_wait: Duration,
}

impl<S: Store + Clone> TimeoutConsumer<S> {
    pub fn new(orders: OrderService<S>, queue: Arc<dyn DelayQueue>) -> Self {
        let poll_wait = orders.config().consumer_poll_wait;
        Self {
            orders,
            queue,
            poll_wait,
        }
    }

    /// Main loop. Returns once `shutdown` is cancelled and the task in hand,
    /// if any, has been processed.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("order timeout consumer started");

        while !shutdown.is_cancelled() {
            if let Err(e) = self.process_next().await {
                tracing::error!(error = %e, "order timeout consumer poll failed");
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(self.poll_wait) => {}
                }
            }
        }

        tracing::info!("order timeout consumer stopped");
    }

    /// Waits up to the poll interval for one due task and handles it.
    ///
    /// Returns whether a task was claimed. A failed cancellation is logged
    /// and left to the reconciliation sweep.
    pub async fn process_next(&self) -> Result<bool> {
        let Some(task) = self.queue.poll_due(self.poll_wait).await? else {
            return Ok(false);
        };

        metrics::counter!("order_timeout_tasks_processed_total").increment(1);
        match self.orders.cancel_timeout_order(task.order_id).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(order_id = %task.order_id, "timeout task was a no-op"),
            Err(e) => tracing::error!(
                order_id = %task.order_id,
                order_number = %task.order_number,
                error = %e,
                "timeout cancellation failed"
            ),
        }
        Ok(true)
    }
}
