//! Buyer cart operations.
//!
//! Stock is only checked here, never reserved: the decrement happens when an
//! order is placed. Every mutation clears the buyer's cached cart with a
//! delayed double delete.

use std::sync::Arc;

use cache::{CacheBackend, CacheInvalidator, CartSummary, CartView, InvalidationGuard, keys};
use common::{CartLineId, Clock, ProductId, SystemClock, UserId};
use domain::{CartLine, ProductStatus};
use serde::Deserialize;
use store::{Store, StoreTx};

use crate::config::FulfillmentConfig;
use crate::{FulfillmentError, Result};

/// Changes to one cart line. `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct CartLineUpdate {
    pub quantity: Option<u32>,
    pub selected: Option<bool>,
}

/// Cart service.
#[derive(Clone)]
pub struct CartService<S: Store + Clone> {
    store: S,
    invalidator: CacheInvalidator,
    view: CartView<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Store + Clone> CartService<S> {
    pub fn new(
        store: S,
        cache: Arc<dyn CacheBackend>,
        invalidator: CacheInvalidator,
        config: &FulfillmentConfig,
    ) -> Self {
        Self {
            view: CartView::new(store.clone(), cache, config.cart_cache_ttl),
            store,
            invalidator,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Adds `quantity` units of a listed product, merging with an existing
    /// line for the same product.
    #[tracing::instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        buyer_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        check_quantity(quantity)?;
        let guard = self.guard(buyer_id).await;
        let mut tx = self.store.begin().await?;

        let existing = tx
            .cart_lines(buyer_id, false)
            .await?
            .into_iter()
            .find(|line| line.product_id == product_id);
        let now = self.clock.now();
        let line = match existing {
            Some(mut line) => {
                line.quantity = line.quantity.saturating_add(quantity);
                line.selected = true;
                line.updated_at = now;
                line
            }
            None => CartLine::new(buyer_id, product_id, quantity, now),
        };
        check_purchasable(&mut tx, buyer_id, product_id, line.quantity).await?;

        tx.upsert_cart_line(&line).await?;
        tx.commit().await?;
        guard.finish();
        Ok(line)
    }

    /// Changes quantity or selection of one line.
    #[tracing::instrument(skip(self))]
    pub async fn update_cart_line(
        &self,
        buyer_id: UserId,
        line_id: CartLineId,
        update: CartLineUpdate,
    ) -> Result<CartLine> {
        if let Some(quantity) = update.quantity {
            check_quantity(quantity)?;
        }
        let guard = self.guard(buyer_id).await;
        let mut tx = self.store.begin().await?;

        let mut line = find_line(&mut tx, buyer_id, line_id).await?;
        if let Some(quantity) = update.quantity {
            check_purchasable(&mut tx, buyer_id, line.product_id, quantity).await?;
            line.quantity = quantity;
        }
        if let Some(selected) = update.selected {
            line.selected = selected;
        }
        line.updated_at = self.clock.now();

        tx.upsert_cart_line(&line).await?;
        tx.commit().await?;
        guard.finish();
        Ok(line)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_cart_line(&self, buyer_id: UserId, line_id: CartLineId) -> Result<()> {
        let guard = self.guard(buyer_id).await;
        let mut tx = self.store.begin().await?;
        if tx.delete_cart_lines(buyer_id, &[line_id]).await? == 0 {
            return Err(FulfillmentError::not_found("cart line", line_id));
        }
        tx.commit().await?;
        guard.finish();
        Ok(())
    }

    /// Selects or deselects every line.
    #[tracing::instrument(skip(self))]
    pub async fn select_all(&self, buyer_id: UserId, selected: bool) -> Result<()> {
        let guard = self.guard(buyer_id).await;
        let mut tx = self.store.begin().await?;
        let now = self.clock.now();
        for mut line in tx.cart_lines(buyer_id, false).await? {
            if line.selected != selected {
                line.selected = selected;
                line.updated_at = now;
                tx.upsert_cart_line(&line).await?;
            }
        }
        tx.commit().await?;
        guard.finish();
        Ok(())
    }

    /// Deletes the selected lines. Returns how many were removed.
    #[tracing::instrument(skip(self))]
    pub async fn remove_selected(&self, buyer_id: UserId) -> Result<u64> {
        self.delete_lines(buyer_id, true).await
    }

    /// Empties the cart. Returns how many lines were removed.
    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self, buyer_id: UserId) -> Result<u64> {
        self.delete_lines(buyer_id, false).await
    }

    /// The buyer's cart with current prices.
    pub async fn cart(&self, buyer_id: UserId) -> Result<CartSummary> {
        Ok(self.view.get(buyer_id).await?)
    }

    async fn delete_lines(&self, buyer_id: UserId, selected_only: bool) -> Result<u64> {
        let guard = self.guard(buyer_id).await;
        let mut tx = self.store.begin().await?;
        let ids: Vec<CartLineId> = tx
            .cart_lines(buyer_id, selected_only)
            .await?
            .iter()
            .map(|line| line.id)
            .collect();
        let deleted = if ids.is_empty() {
            0
        } else {
            tx.delete_cart_lines(buyer_id, &ids).await?
        };
        tx.commit().await?;
        guard.finish();
        Ok(deleted)
    }

    async fn guard(&self, buyer_id: UserId) -> InvalidationGuard {
        self.invalidator.guard(vec![keys::cart(buyer_id)]).await
    }
}

fn check_quantity(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(FulfillmentError::Validation(
            "quantity must be at least 1".to_string(),
        ));
    }
    Ok(())
}

async fn find_line<T: StoreTx>(
    tx: &mut T,
    buyer_id: UserId,
    line_id: CartLineId,
) -> Result<CartLine> {
    tx.cart_lines(buyer_id, false)
        .await?
        .into_iter()
        .find(|line| line.id == line_id)
        .ok_or_else(|| FulfillmentError::not_found("cart line", line_id))
}

/// Checks that the product is listed, not the buyer's own, and currently
/// holds `quantity` units.
async fn check_purchasable<T: StoreTx>(
    tx: &mut T,
    buyer_id: UserId,
    product_id: ProductId,
    quantity: u32,
) -> Result<()> {
    let product = tx
        .product(product_id)
        .await?
        .ok_or_else(|| FulfillmentError::not_found("product", product_id))?;
    if product.seller_id == buyer_id {
        return Err(FulfillmentError::Validation(
            "buyers cannot add their own products".to_string(),
        ));
    }
    match product.status {
        ProductStatus::OnShelf | ProductStatus::SoldOut => {}
        ProductStatus::Draft | ProductStatus::OffShelf => {
            return Err(FulfillmentError::Validation(format!(
                "product {product_id} is not on sale"
            )));
        }
    }
    if product.stock < i64::from(quantity) {
        return Err(FulfillmentError::StockInsufficient {
            product_id,
            requested: quantity,
            available: product.stock,
        });
    }
    Ok(())
}
