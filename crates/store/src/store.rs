use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{AddressId, CartLineId, OrderId, ProductId, UserId, Version};
use domain::{
    CartLine, Money, Order, OrderAddress, OrderItem, OrderNumber, OrderStatus, Product,
    ProductStatus, ShippingAddress, StockLevel,
};

use crate::Result;

/// Everything written when an order is placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub address: OrderAddress,
}

/// Core trait for store implementations.
///
/// Reads on the store itself see committed rows only. Writes always go
/// through a [`StoreTx`] obtained from [`Store::begin`].
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: StoreTx + 'static;

    /// Opens a transaction. Dropping it without [`StoreTx::commit`] rolls it back.
    async fn begin(&self) -> Result<Self::Tx>;

    async fn product(&self, id: ProductId) -> Result<Option<Product>>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>>;

    async fn order_items(&self, id: OrderId) -> Result<Vec<OrderItem>>;

    async fn order_address(&self, id: OrderId) -> Result<Option<OrderAddress>>;

    /// Orders placed by `buyer`, newest first, optionally filtered by status.
    async fn orders_for_buyer(
        &self,
        buyer: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>>;

    /// Orders sold by `seller`, newest first, optionally filtered by status.
    async fn orders_for_seller(
        &self,
        seller: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>>;

    /// Up to `limit` orders still in `PendingPayment` that were created at or
    /// before `deadline`, oldest first.
    async fn expired_pending_orders(
        &self,
        deadline: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>>;

    /// All cart lines of `buyer`, oldest first.
    async fn cart_lines(&self, buyer: UserId) -> Result<Vec<CartLine>>;

    /// Increments and returns the persisted order counter for `day`.
    ///
    /// Runs outside any transaction so concurrent checkouts do not queue on
    /// the counter row.
    async fn next_order_sequence(&self, day: NaiveDate) -> Result<u64>;
}

/// A unit of work against the store.
///
/// Conditional updates report the number of rows they affected; `0` means
/// the precondition did not hold (lost race, missing row, wrong owner).
#[async_trait]
pub trait StoreTx: Send {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>>;

    async fn stock_level(&mut self, id: ProductId) -> Result<Option<StockLevel>>;

    async fn shipping_address(&mut self, id: AddressId) -> Result<Option<ShippingAddress>>;

    /// Cart lines of `buyer`, oldest first.
    async fn cart_lines(&mut self, buyer: UserId, selected_only: bool) -> Result<Vec<CartLine>>;

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>>;

    async fn order_items(&mut self, id: OrderId) -> Result<Vec<OrderItem>>;

    /// Decrements stock by `quantity` only if the row is still at `expected`
    /// and holds at least `quantity` units. Bumps the version and flips a
    /// listed product to sold out when it reaches zero.
    async fn compare_and_decrease_stock(
        &mut self,
        id: ProductId,
        quantity: u32,
        expected: Version,
    ) -> Result<u64>;

    /// Adds `quantity` back unconditionally and bumps the version.
    async fn increase_stock(&mut self, id: ProductId, quantity: u32) -> Result<u64>;

    async fn insert_product(&mut self, product: &Product) -> Result<()>;

    /// Edits name and price of a product owned by `seller`.
    async fn update_product_details(
        &mut self,
        id: ProductId,
        seller: UserId,
        name: &str,
        price: Money,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    /// Changes the listing status of a product owned by `seller`. Listing a
    /// product without stock stores it as sold out.
    async fn set_product_status(
        &mut self,
        id: ProductId,
        seller: UserId,
        status: ProductStatus,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    /// Inserts the line or overwrites quantity and selection of an existing one.
    async fn upsert_cart_line(&mut self, line: &CartLine) -> Result<()>;

    async fn delete_cart_lines(&mut self, buyer: UserId, ids: &[CartLineId]) -> Result<u64>;

    async fn insert_order(&mut self, order: &NewOrder) -> Result<()>;

    /// Writes `order` back only if the stored row is still at `expected`.
    async fn compare_and_update_order(&mut self, order: &Order, expected: Version) -> Result<u64>;

    async fn commit(self) -> Result<()>;
}
