//! Order lifecycle operations.
//!
//! Placing an order decrements stock, writes the order with its items and
//! address snapshot, consumes the cart lines and enqueues the cancellation
//! task, all inside one store transaction. Later status changes go through
//! the domain transition table and are written back with a compare-and-swap
//! on the order version, so concurrent actions on one order resolve to
//! exactly one winner.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use cache::{CacheInvalidator, keys};
use common::{AddressId, CartLineId, Clock, OrderId, ProductId, SystemClock, UserId};
use domain::{
    Amounts, Effect, Money, Order, OrderAction, OrderAddress, OrderItem, OrderNumber, OrderStatus,
    ProductStatus,
};
use serde::{Deserialize, Serialize};
use store::{NewOrder, Store, StoreTx};

use crate::config::FulfillmentConfig;
use crate::services::{
    ExchangeRateService, FlatPricing, PricingInput, PricingService, StaticExchangeRates,
};
use crate::stock::StockDecrementer;
use crate::timeout::{CancellationTask, DelayQueue};
use crate::{FulfillmentError, Result};

/// Cancel reason recorded by the timeout path.
pub const TIMEOUT_CANCEL_REASON: &str = "timed out unpaid";

/// Cancel reason recorded when a buyer cancels without giving one.
pub const BUYER_CANCEL_REASON: &str = "cancelled by buyer";

/// One product line requested at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedItem {
    pub product_id: ProductId,
    pub quantity: u32,
    /// The cart line this item came from; it is removed with the order.
    #[serde(default)]
    pub cart_line_id: Option<CartLineId>,
}

/// Input of [`OrderService::create_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrder {
    pub buyer_id: UserId,
    pub address_id: AddressId,
    pub items: Vec<SelectedItem>,
    /// Currency to show the total in, if not the stored currency.
    pub target_currency: Option<String>,
    pub remark: Option<String>,
}

/// An order with its items and address snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub address: Option<OrderAddress>,
}

/// Order lifecycle service.
#[derive(Clone)]
pub struct OrderService<S: Store + Clone> {
    store: S,
    queue: Arc<dyn DelayQueue>,
    invalidator: CacheInvalidator,
    stock: StockDecrementer,
    pricing: Arc<dyn PricingService>,
    rates: Arc<dyn ExchangeRateService>,
    clock: Arc<dyn Clock>,
    config: Arc<FulfillmentConfig>,
}

impl<S: Store + Clone> OrderService<S> {
    /// Creates a service with pass-through pricing and the system clock.
    pub fn new(
        store: S,
        queue: Arc<dyn DelayQueue>,
        invalidator: CacheInvalidator,
        config: FulfillmentConfig,
    ) -> Self {
        Self {
            store,
            queue,
            invalidator,
            stock: StockDecrementer::new(config.stock_retry),
            pricing: Arc::new(FlatPricing::default()),
            rates: Arc::new(StaticExchangeRates::new()),
            clock: Arc::new(SystemClock),
            config: Arc::new(config),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_pricing(mut self, pricing: Arc<dyn PricingService>) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_exchange_rates(mut self, rates: Arc<dyn ExchangeRateService>) -> Self {
        self.rates = rates;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &FulfillmentConfig {
        &self.config
    }

    /// Places an order for the selected products.
    ///
    /// All-or-nothing: if any item fails its checks or its stock decrement,
    /// or the cancellation task cannot be enqueued, nothing is written.
    #[tracing::instrument(skip(self, request), fields(buyer_id = %request.buyer_id))]
    pub async fn create_order(&self, request: CreateOrder) -> Result<Order> {
        let started = Instant::now();
        validate_selection(&request.items)?;

        let now = self.clock.now();
        let sequence = self.store.next_order_sequence(now.date_naive()).await?;
        let order_id = OrderId::new();
        let order_number = OrderNumber::generate(now, request.buyer_id, sequence);

        let mut cache_keys: Vec<String> = request
            .items
            .iter()
            .map(|item| keys::product(item.product_id))
            .collect();
        let consumed: Vec<CartLineId> = request
            .items
            .iter()
            .filter_map(|item| item.cart_line_id)
            .collect();
        if !consumed.is_empty() {
            cache_keys.push(keys::cart(request.buyer_id));
        }
        let guard = self.invalidator.guard(cache_keys).await;

        let mut tx = self.store.begin().await?;

        let address = tx
            .shipping_address(request.address_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("address", request.address_id))?;
        if address.user_id != request.buyer_id {
            return Err(FulfillmentError::Authorization(format!(
                "address {} does not belong to buyer {}",
                request.address_id, request.buyer_id
            )));
        }

        if !consumed.is_empty() {
            consume_cart_lines(&mut tx, request.buyer_id, &request.items, &consumed).await?;
        }

        let mut seller_id: Option<UserId> = None;
        let mut items = Vec::with_capacity(request.items.len());
        for selected in &request.items {
            let product = tx
                .product(selected.product_id)
                .await?
                .ok_or_else(|| FulfillmentError::not_found("product", selected.product_id))?;

            match product.status {
                ProductStatus::OnShelf => {}
                ProductStatus::SoldOut => {
                    return Err(FulfillmentError::StockInsufficient {
                        product_id: product.id,
                        requested: selected.quantity,
                        available: product.stock,
                    });
                }
                ProductStatus::Draft | ProductStatus::OffShelf => {
                    return Err(FulfillmentError::Validation(format!(
                        "product {} is not on sale",
                        product.id
                    )));
                }
            }
            if product.seller_id == request.buyer_id {
                return Err(FulfillmentError::Validation(
                    "buyers cannot order their own products".to_string(),
                ));
            }
            match seller_id {
                None => seller_id = Some(product.seller_id),
                Some(seller) if seller != product.seller_id => {
                    return Err(FulfillmentError::Validation(
                        "an order can only contain products of one seller".to_string(),
                    ));
                }
                Some(_) => {}
            }

            items.push(OrderItem::new(
                order_id,
                product.id,
                product.name,
                product.price,
                selected.quantity,
            ));
        }

        // Ascending product id, whatever order the buyer listed them in.
        let mut lock_order: Vec<&SelectedItem> = request.items.iter().collect();
        lock_order.sort_by_key(|item| item.product_id);
        for selected in lock_order {
            self.stock
                .decrease(&mut tx, selected.product_id, selected.quantity)
                .await?;
        }
        let seller_id = seller_id.ok_or_else(|| {
            FulfillmentError::Validation("at least one item must be selected".to_string())
        })?;

        let product_amount: Money = items.iter().map(|item| item.subtotal).sum();
        let quote = self
            .pricing
            .quote(&PricingInput {
                buyer_id: request.buyer_id,
                seller_id,
                items: &items,
                product_amount,
            })
            .await?;
        let exchange_rate = match &request.target_currency {
            Some(target) => self.rates.rate(&self.config.currency, target).await?,
            None => rust_decimal::Decimal::ONE,
        };

        let order = Order::place(
            order_id,
            order_number,
            request.buyer_id,
            seller_id,
            Amounts {
                product: product_amount,
                freight: quote.freight,
                discount: quote.discount,
            },
            self.config.currency.clone(),
            request.target_currency,
            exchange_rate,
            request.remark,
            now,
        )?;

        tx.insert_order(&NewOrder {
            order: order.clone(),
            items,
            address: address.snapshot_for(order_id),
        })
        .await?;

        let task = CancellationTask::for_order(&order);
        self.queue
            .offer(task.clone(), self.config.order_timeout)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "could not schedule order timeout"))?;

        if let Err(e) = tx.commit().await {
            if let Err(remove_err) = self.queue.remove(&task).await {
                tracing::warn!(error = %remove_err, "could not withdraw timeout task of failed order");
            }
            return Err(e.into());
        }
        guard.finish();

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("order_create_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "order created"
        );
        Ok(order)
    }

    /// Places an order for every selected line of the buyer's cart.
    #[tracing::instrument(skip(self, remark))]
    pub async fn checkout_cart(
        &self,
        buyer_id: UserId,
        address_id: AddressId,
        target_currency: Option<String>,
        remark: Option<String>,
    ) -> Result<Order> {
        let items: Vec<SelectedItem> = self
            .store
            .cart_lines(buyer_id)
            .await?
            .into_iter()
            .filter(|line| line.selected)
            .map(|line| SelectedItem {
                product_id: line.product_id,
                quantity: line.quantity,
                cart_line_id: Some(line.id),
            })
            .collect();

        self.create_order(CreateOrder {
            buyer_id,
            address_id,
            items,
            target_currency,
            remark,
        })
        .await
    }

    /// Marks an unpaid order as paid and withdraws its timeout task.
    #[tracing::instrument(skip(self))]
    pub async fn pay_order(&self, buyer_id: UserId, order_id: OrderId) -> Result<Order> {
        let order = self
            .transition(order_id, OrderAction::Pay, Some(buyer_id), None)
            .await?;
        metrics::counter!("orders_paid_total").increment(1);
        tracing::info!(order_number = %order.order_number, "order paid");
        Ok(order)
    }

    /// Cancels an unpaid order at the buyer's request and restores its stock.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel_order(
        &self,
        buyer_id: UserId,
        order_id: OrderId,
        reason: Option<&str>,
    ) -> Result<Order> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(BUYER_CANCEL_REASON);
        let order = self
            .transition(order_id, OrderAction::Cancel, Some(buyer_id), Some(reason))
            .await?;
        metrics::counter!("orders_cancelled_total", "reason" => "buyer").increment(1);
        tracing::info!(order_number = %order.order_number, "order cancelled by buyer");
        Ok(order)
    }

    /// Cancels the order if it is still unpaid.
    ///
    /// Idempotent: a missing order, or one that was paid or cancelled in the
    /// meantime, is left alone and reported as `Ok(false)`.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_timeout_order(&self, order_id: OrderId) -> Result<bool> {
        match self
            .transition(order_id, OrderAction::Timeout, None, Some(TIMEOUT_CANCEL_REASON))
            .await
        {
            Ok(order) => {
                metrics::counter!("orders_cancelled_total", "reason" => "timeout").increment(1);
                tracing::info!(order_number = %order.order_number, "unpaid order cancelled");
                Ok(true)
            }
            Err(FulfillmentError::NotFound { .. }) => {
                tracing::warn!("timeout fired for unknown order");
                Ok(false)
            }
            Err(FulfillmentError::StateConflict(reason)) => {
                tracing::debug!(%reason, "order no longer pending payment");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Marks a paid order as shipped.
    #[tracing::instrument(skip(self))]
    pub async fn ship_order(&self, seller_id: UserId, order_id: OrderId) -> Result<Order> {
        let order = self
            .transition(order_id, OrderAction::Ship, Some(seller_id), None)
            .await?;
        tracing::info!(order_number = %order.order_number, "order shipped");
        Ok(order)
    }

    /// Confirms receipt of a shipped order.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_order(&self, buyer_id: UserId, order_id: OrderId) -> Result<Order> {
        let order = self
            .transition(order_id, OrderAction::Confirm, Some(buyer_id), None)
            .await?;
        tracing::info!(order_number = %order.order_number, "order completed");
        Ok(order)
    }

    /// Loads an order visible to `viewer`, its buyer or its seller.
    pub async fn get_order(&self, viewer: UserId, order_id: OrderId) -> Result<OrderDetails> {
        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("order", order_id))?;
        self.details_for(viewer, order).await
    }

    /// Looks an order up by its human-facing number.
    pub async fn get_order_by_number(&self, viewer: UserId, number: &str) -> Result<OrderDetails> {
        let number = OrderNumber::parse(number)
            .map_err(|e| FulfillmentError::Validation(e.to_string()))?;
        let order = self
            .store
            .order_by_number(&number)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("order", &number))?;
        self.details_for(viewer, order).await
    }

    /// Orders placed by `buyer_id`, newest first.
    pub async fn buyer_orders(
        &self,
        buyer_id: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        Ok(self.store.orders_for_buyer(buyer_id, status).await?)
    }

    /// Orders sold by `seller_id`, newest first.
    pub async fn seller_orders(
        &self,
        seller_id: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        Ok(self.store.orders_for_seller(seller_id, status).await?)
    }

    async fn details_for(&self, viewer: UserId, order: Order) -> Result<OrderDetails> {
        if viewer != order.buyer_id && viewer != order.seller_id {
            return Err(FulfillmentError::Authorization(format!(
                "order {} is not visible to {viewer}",
                order.id
            )));
        }
        let items = self.store.order_items(order.id).await?;
        let address = self.store.order_address(order.id).await?;
        Ok(OrderDetails {
            order,
            items,
            address,
        })
    }

    /// Runs one guarded status change and its side effects.
    async fn transition(
        &self,
        order_id: OrderId,
        action: OrderAction,
        caller: Option<UserId>,
        reason: Option<&str>,
    ) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let current = tx
            .order(order_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("order", order_id))?;
        current.authorize(action, caller)?;
        let applied = current.apply(action, self.clock.now(), reason)?;

        let mut guard = None;
        if applied.has_effect(Effect::ReleaseStock) {
            let mut items = tx.order_items(order_id).await?;
            items.sort_by_key(|item| item.product_id);
            guard = Some(
                self.invalidator
                    .guard(items.iter().map(|i| keys::product(i.product_id)).collect())
                    .await,
            );
            for item in &items {
                self.stock
                    .increase(&mut tx, item.product_id, item.quantity)
                    .await?;
            }
        }

        if tx
            .compare_and_update_order(&applied.order, current.version)
            .await?
            == 0
        {
            return Err(FulfillmentError::StateConflict(format!(
                "order {order_id} changed concurrently"
            )));
        }
        tx.commit().await?;
        if let Some(guard) = guard {
            guard.finish();
        }

        if applied.has_effect(Effect::RemoveTimeoutTask) {
            let task = CancellationTask::for_order(&applied.order);
            match self.queue.remove(&task).await {
                Ok(removed) => tracing::debug!(removed, "timeout task withdrawn"),
                // A task left behind finds the order no longer pending and does nothing.
                Err(e) => tracing::warn!(error = %e, "could not withdraw timeout task"),
            }
        }

        Ok(applied.order)
    }
}

/// Deletes the cart lines an order is built from.
///
/// Every line must still be in the buyer's cart and hold the product it is
/// ordered for. A line already consumed by a concurrent order deletes zero
/// rows, which aborts this one.
async fn consume_cart_lines<T: StoreTx>(
    tx: &mut T,
    buyer_id: UserId,
    items: &[SelectedItem],
    consumed: &[CartLineId],
) -> Result<()> {
    let lines = tx.cart_lines(buyer_id, false).await?;
    for item in items {
        let Some(line_id) = item.cart_line_id else {
            continue;
        };
        let line = lines.iter().find(|line| line.id == line_id).ok_or_else(|| {
            FulfillmentError::StateConflict(format!(
                "cart line {line_id} is no longer in the cart"
            ))
        })?;
        if line.product_id != item.product_id {
            return Err(FulfillmentError::Validation(format!(
                "cart line {line_id} does not hold product {}",
                item.product_id
            )));
        }
    }

    let deleted = tx.delete_cart_lines(buyer_id, consumed).await?;
    if deleted != consumed.len() as u64 {
        return Err(FulfillmentError::StateConflict(
            "cart lines were checked out concurrently".to_string(),
        ));
    }
    Ok(())
}

fn validate_selection(items: &[SelectedItem]) -> Result<()> {
    if items.is_empty() {
        return Err(FulfillmentError::Validation(
            "at least one item must be selected".to_string(),
        ));
    }
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if item.quantity == 0 {
            return Err(FulfillmentError::Validation(format!(
                "quantity of product {} must be at least 1",
                item.product_id
            )));
        }
        if !seen.insert(item.product_id) {
            return Err(FulfillmentError::Validation(format!(
                "product {} selected more than once",
                item.product_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: ProductId, quantity: u32) -> SelectedItem {
        SelectedItem {
            product_id,
            quantity,
            cart_line_id: None,
        }
    }

    #[test]
    fn test_empty_selection_is_rejected() {
        assert!(matches!(
            validate_selection(&[]),
            Err(FulfillmentError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        assert!(matches!(
            validate_selection(&[item(ProductId::new(), 0)]),
            Err(FulfillmentError::Validation(_))
        ));
    }

    #[test]
    fn test_duplicate_products_are_rejected() {
        let id = ProductId::new();
        assert!(matches!(
            validate_selection(&[item(id, 1), item(id, 2)]),
            Err(FulfillmentError::Validation(_))
        ));
        assert!(validate_selection(&[item(id, 1), item(ProductId::new(), 2)]).is_ok());
    }
}
