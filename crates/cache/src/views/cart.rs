//! Per-buyer cart view with live prices and totals.

use std::sync::Arc;
use std::time::Duration;

use common::{CartLineId, ProductId, UserId};
use domain::{Money, ProductStatus};
use serde::{Deserialize, Serialize};
use store::Store;

use super::read_through;
use crate::{CacheBackend, Result, keys};

/// One cart line joined with the current product row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItemView {
    pub line_id: CartLineId,
    pub product_id: ProductId,
    pub product_name: String,
    /// Current price, not frozen: carts follow price edits.
    pub price: Money,
    pub quantity: u32,
    pub subtotal: Money,
    pub selected: bool,
    pub stock: i64,
    pub on_shelf: bool,
}

/// A buyer's cart as shown on the cart page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub buyer_id: UserId,
    pub items: Vec<CartItemView>,
    pub total_quantity: u64,
    pub total_price: Money,
}

impl CartSummary {
    pub fn empty(buyer_id: UserId) -> Self {
        Self {
            buyer_id,
            items: Vec::new(),
            total_quantity: 0,
            total_price: Money::zero(),
        }
    }
}

/// Read-through view over `cart:{buyer}`.
#[derive(Clone)]
pub struct CartView<S: Store + Clone> {
    store: S,
    cache: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl<S: Store + Clone> CartView<S> {
    pub fn new(store: S, cache: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, buyer: UserId) -> Result<CartSummary> {
        let summary = read_through(
            self.cache.as_ref(),
            "cart",
            &keys::cart(buyer),
            self.ttl,
            || async move { self.load(buyer).await.map(Some) },
        )
        .await?;
        Ok(summary.unwrap_or_else(|| CartSummary::empty(buyer)))
    }

    async fn load(&self, buyer: UserId) -> Result<CartSummary> {
        let mut summary = CartSummary::empty(buyer);
        for line in self.store.cart_lines(buyer).await? {
            // Lines whose product vanished are hidden, not removed.
            let Some(product) = self.store.product(line.product_id).await? else {
                continue;
            };
            let subtotal = product.price.multiply(line.quantity);
            summary.total_quantity += u64::from(line.quantity);
            summary.total_price = summary.total_price + subtotal;
            summary.items.push(CartItemView {
                line_id: line.id,
                product_id: product.id,
                product_name: product.name,
                price: product.price,
                quantity: line.quantity,
                subtotal,
                selected: line.selected,
                stock: product.stock,
                on_shelf: product.status == ProductStatus::OnShelf,
            });
        }
        Ok(summary)
    }
}
