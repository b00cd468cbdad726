//! Optimistic stock control.
//!
//! A decrement reads `(stock, version)`, then issues a conditional update
//! that only succeeds while the row is still at that version and holds
//! enough units. A lost race re-reads and retries with exponential backoff;
//! a lack of units fails at once.
//!
//! Callers touching several products must decrement them in ascending id
//! order so concurrent transactions take row locks in the same order.

use common::ProductId;
use store::StoreTx;

use crate::config::StockRetryPolicy;
use crate::{FulfillmentError, Result};

/// Decrements and restores product stock inside a caller's transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockDecrementer {
    policy: StockRetryPolicy,
}

impl StockDecrementer {
    pub fn new(policy: StockRetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> StockRetryPolicy {
        self.policy
    }

    /// Removes `quantity` units of `product_id`.
    ///
    /// Returns the stock left after the decrement. Never drives stock below
    /// zero: an insufficient read fails with
    /// [`FulfillmentError::StockInsufficient`] without writing, and every
    /// write is conditional on the version that was read.
    #[tracing::instrument(skip(self, tx))]
    pub async fn decrease<T: StoreTx>(
        &self,
        tx: &mut T,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<i64> {
        if quantity == 0 {
            return Err(FulfillmentError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        let attempts = self.policy.max_attempts.max(1);
        for attempt in 0..attempts {
            let level = tx
                .stock_level(product_id)
                .await?
                .ok_or_else(|| FulfillmentError::not_found("product", product_id))?;

            if !level.covers(quantity) {
                metrics::counter!("stock_insufficient_total").increment(1);
                tracing::info!(stock = level.stock, "insufficient stock");
                return Err(FulfillmentError::StockInsufficient {
                    product_id,
                    requested: quantity,
                    available: level.stock,
                });
            }

            let affected = match tx
                .compare_and_decrease_stock(product_id, quantity, level.version)
                .await
            {
                Ok(affected) => affected,
                // The transaction is aborted; only a fresh one can retry.
                Err(e) if e.is_lock_conflict() => {
                    metrics::counter!("stock_contention_total").increment(1);
                    tracing::warn!(attempt, error = %e, "stock decrement aborted by lock conflict");
                    return Err(FulfillmentError::StockContention {
                        product_id,
                        attempts: attempt + 1,
                    });
                }
                Err(e) => return Err(e.into()),
            };
            if affected == 1 {
                metrics::counter!("stock_decrements_total").increment(1);
                tracing::debug!(attempt, "stock decremented");
                return Ok(level.stock - i64::from(quantity));
            }

            metrics::counter!("stock_cas_conflicts_total").increment(1);
            tracing::debug!(attempt, version = %level.version, "stock version moved, retrying");
            if attempt + 1 < attempts {
                tokio::time::sleep(self.policy.backoff(attempt)).await;
            }
        }

        metrics::counter!("stock_contention_total").increment(1);
        tracing::warn!(attempts, "stock decrement gave up under contention");
        Err(FulfillmentError::StockContention {
            product_id,
            attempts,
        })
    }

    /// Puts `quantity` units of `product_id` back.
    #[tracing::instrument(skip(self, tx))]
    pub async fn increase<T: StoreTx>(
        &self,
        tx: &mut T,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<()> {
        if quantity == 0 {
            return Err(FulfillmentError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }
        if tx.increase_stock(product_id, quantity).await? == 0 {
            return Err(FulfillmentError::not_found("product", product_id));
        }
        tracing::debug!("stock released");
        Ok(())
    }
}
