//! Delayed cancellation of unpaid orders.
//!
//! Every new order enqueues a [`CancellationTask`] that becomes due after the
//! payment timeout. A [`TimeoutConsumer`] claims due tasks and cancels the
//! orders that are still unpaid. The [`ReconciliationSweep`] periodically
//! cancels expired orders straight from the order table, covering tasks that
//! were lost, so cancellation is at-least-once overall.

mod consumer;
mod postgres;
mod queue;
mod sweep;
mod task;

pub use consumer::TimeoutConsumer;
pub use postgres::PostgresDelayQueue;
pub use queue::{DelayQueue, InMemoryDelayQueue, QueueError};
pub use sweep::ReconciliationSweep;
pub use task::CancellationTask;
