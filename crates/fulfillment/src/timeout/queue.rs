//! Delay queue trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::CancellationTask;

/// Errors raised by a delay queue backend.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Delay queue unavailable: {0}")]
    Unavailable(String),
}

/// Tasks that become visible to consumers only once their delay elapsed.
#[async_trait]
pub trait DelayQueue: Send + Sync {
    /// Schedules `task` to become due after `delay`. A task already queued
    /// for the same order is replaced.
    async fn offer(&self, task: CancellationTask, delay: Duration) -> Result<(), QueueError>;

    /// Removes the task queued for the same order. Returns whether one was
    /// queued; removing an absent task is not an error.
    async fn remove(&self, task: &CancellationTask) -> Result<bool, QueueError>;

    /// Claims the earliest due task, waiting up to `wait` for one to come due.
    ///
    /// A claimed task is gone from the queue. Each task is handed to at most
    /// one consumer.
    async fn poll_due(&self, wait: Duration) -> Result<Option<CancellationTask>, QueueError>;

    /// Number of queued tasks, due or not.
    async fn len(&self) -> Result<usize, QueueError>;
}

/// In-memory delay queue for tests and single-process deployments.
///
/// Due times follow tokio's clock. Tasks do not survive a restart; the
/// reconciliation sweep picks up what is lost.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDelayQueue {
    tasks: Arc<Mutex<HashMap<OrderId, (CancellationTask, Instant)>>>,
    notify: Arc<Notify>,
    fail_on_offer: Arc<AtomicBool>,
}

impl InMemoryDelayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every offer fail until reset.
    pub fn set_fail_on_offer(&self, fail: bool) {
        self.fail_on_offer.store(fail, Ordering::SeqCst);
    }

    /// Returns true if a task is queued for `order_id`.
    pub fn contains(&self, order_id: OrderId) -> bool {
        self.tasks().contains_key(&order_id)
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<OrderId, (CancellationTask, Instant)>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the earliest due task, or reports when the next one comes due.
    fn take_due(&self, now: Instant) -> Result<CancellationTask, Option<Instant>> {
        let mut tasks = self.tasks();
        let earliest = tasks
            .iter()
            .min_by_key(|(_, (_, due))| *due)
            .map(|(id, (_, due))| (*id, *due));
        match earliest {
            Some((id, due)) if due <= now => match tasks.remove(&id) {
                Some((task, _)) => Ok(task),
                None => Err(None),
            },
            Some((_, due)) => Err(Some(due)),
            None => Err(None),
        }
    }
}

#[async_trait]
impl DelayQueue for InMemoryDelayQueue {
    async fn offer(&self, task: CancellationTask, delay: Duration) -> Result<(), QueueError> {
        if self.fail_on_offer.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("offer rejected".to_string()));
        }
        self.tasks()
            .insert(task.order_id, (task, Instant::now() + delay));
        self.notify.notify_waiters();
        Ok(())
    }

    async fn remove(&self, task: &CancellationTask) -> Result<bool, QueueError> {
        Ok(self.tasks().remove(&task.order_id).is_some())
    }

    async fn poll_due(&self, wait: Duration) -> Result<Option<CancellationTask>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            let now = Instant::now();
            let wake = match self.take_due(now) {
                Ok(task) => return Ok(Some(task)),
                Err(next_due) => next_due.map_or(deadline, |due| due.min(deadline)),
            };
            if now >= deadline {
                return Ok(None);
            }
            tokio::select! {
                () = notified => {}
                () = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.tasks().len())
    }
}
