//! Delay queue persisted in the `order_timeout_tasks` table.

use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, UserId};
use domain::OrderNumber;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{CancellationTask, DelayQueue, QueueError};

/// PostgreSQL-backed delay queue.
///
/// Tasks survive restarts. Claims use `FOR UPDATE SKIP LOCKED`, so several
/// consumers, in one process or many, never receive the same task.
#[derive(Clone)]
pub struct PostgresDelayQueue {
    pool: PgPool,
    poll_interval: Duration,
}

impl PostgresDelayQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            poll_interval: Duration::from_millis(250),
        }
    }

    /// How often `poll_due` re-checks the table while waiting.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn claim(&self) -> Result<Option<CancellationTask>, QueueError> {
        let row = sqlx::query(
            r#"
            DELETE FROM order_timeout_tasks
            WHERE order_id = (
                SELECT order_id FROM order_timeout_tasks
                WHERE fire_at <= now()
                ORDER BY fire_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING order_id, order_number, buyer_id, created_at
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_task).transpose()
    }
}

fn row_to_task(row: PgRow) -> Result<CancellationTask, QueueError> {
    let number: String = row.try_get("order_number")?;
    let order_number = OrderNumber::parse(&number)
        .map_err(|e| QueueError::Unavailable(format!("corrupt task row: {e}")))?;
    Ok(CancellationTask {
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        order_number,
        buyer_id: UserId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl DelayQueue for PostgresDelayQueue {
    async fn offer(&self, task: CancellationTask, delay: Duration) -> Result<(), QueueError> {
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        sqlx::query(
            r#"
            INSERT INTO order_timeout_tasks (order_id, order_number, buyer_id, created_at, fire_at)
            VALUES ($1, $2, $3, $4, now() + $5 * interval '1 millisecond')
            ON CONFLICT (order_id) DO UPDATE
            SET order_number = EXCLUDED.order_number,
                buyer_id = EXCLUDED.buyer_id,
                created_at = EXCLUDED.created_at,
                fire_at = EXCLUDED.fire_at
            "#,
        )
        .bind(task.order_id.as_uuid())
        .bind(task.order_number.as_str())
        .bind(task.buyer_id.as_uuid())
        .bind(task.created_at)
        .bind(delay_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, task: &CancellationTask) -> Result<bool, QueueError> {
        let result = sqlx::query("DELETE FROM order_timeout_tasks WHERE order_id = $1")
            .bind(task.order_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn poll_due(&self, wait: Duration) -> Result<Option<CancellationTask>, QueueError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(task) = self.claim().await? {
                return Ok(Some(task));
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn len(&self) -> Result<usize, QueueError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_timeout_tasks")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
