use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{AddressId, CartLineId, OrderId, ProductId, UserId, Version};
use domain::{
    CartLine, Money, Order, OrderAddress, OrderItem, OrderNumber, OrderStatus, Product,
    ProductStatus, ShippingAddress, StockLevel,
};
use tokio::sync::OwnedMutexGuard;

use crate::{NewOrder, Result, Store, StoreError, StoreTx};

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    addresses: HashMap<AddressId, ShippingAddress>,
    cart_lines: HashMap<CartLineId, CartLine>,
    orders: HashMap<OrderId, Order>,
    order_items: HashMap<OrderId, Vec<OrderItem>>,
    order_addresses: HashMap<OrderId, OrderAddress>,
    sequences: HashMap<NaiveDate, u64>,
    cas_conflicts: HashMap<ProductId, u32>,
    lock_conflicts: HashMap<ProductId, u32>,
    fail_next_commit: bool,
}

/// In-memory store for tests and single-process deployments.
///
/// Transactions are serialized: [`Store::begin`] waits for the previous
/// transaction to commit or drop. Writes are buffered in the transaction and
/// applied in one step on commit, so non-transactional reads never see
/// uncommitted rows.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    writer: Arc<tokio::sync::Mutex<()>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds a product row.
    pub fn insert_product(&self, product: Product) {
        self.tables().products.insert(product.id, product);
    }

    /// Seeds an address book entry.
    pub fn insert_address(&self, address: ShippingAddress) {
        self.tables().addresses.insert(address.id, address);
    }

    /// Seeds a cart line.
    pub fn insert_cart_line(&self, line: CartLine) {
        self.tables().cart_lines.insert(line.id, line);
    }

    /// Makes the next `times` conditional decrements of `product` lose their
    /// race, as if another writer got there first.
    pub fn inject_cas_conflicts(&self, product: ProductId, times: u32) {
        self.tables().cas_conflicts.insert(product, times);
    }

    /// Makes the next `times` conditional decrements of `product` abort the
    /// transaction the way a database deadlock would.
    pub fn inject_lock_conflicts(&self, product: ProductId, times: u32) {
        self.tables().lock_conflicts.insert(product, times);
    }

    /// Makes the next commit fail.
    pub fn fail_next_commit(&self) {
        self.tables().fail_next_commit = true;
    }

    /// Returns the total number of orders stored.
    pub fn order_count(&self) -> usize {
        self.tables().orders.len()
    }
}

fn sorted_newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        let writer = self.writer.clone().lock_owned().await;
        Ok(InMemoryTx {
            _writer: writer,
            tables: self.tables.clone(),
            products: HashMap::new(),
            orders: HashMap::new(),
            new_orders: Vec::new(),
            cart: HashMap::new(),
        })
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables().products.get(&id).cloned())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables().orders.get(&id).cloned())
    }

    async fn order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        Ok(self
            .tables()
            .orders
            .values()
            .find(|o| &o.order_number == number)
            .cloned())
    }

    async fn order_items(&self, id: OrderId) -> Result<Vec<OrderItem>> {
        Ok(self
            .tables()
            .order_items
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn order_address(&self, id: OrderId) -> Result<Option<OrderAddress>> {
        Ok(self.tables().order_addresses.get(&id).cloned())
    }

    async fn orders_for_buyer(
        &self,
        buyer: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        let orders = self
            .tables()
            .orders
            .values()
            .filter(|o| o.buyer_id == buyer && status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        Ok(sorted_newest_first(orders))
    }

    async fn orders_for_seller(
        &self,
        seller: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        let orders = self
            .tables()
            .orders
            .values()
            .filter(|o| o.seller_id == seller && status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        Ok(sorted_newest_first(orders))
    }

    async fn expired_pending_orders(
        &self,
        deadline: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .tables()
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::PendingPayment && o.created_at <= deadline)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        orders.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(orders)
    }

    async fn cart_lines(&self, buyer: UserId) -> Result<Vec<CartLine>> {
        let mut lines: Vec<CartLine> = self
            .tables()
            .cart_lines
            .values()
            .filter(|l| l.buyer_id == buyer)
            .cloned()
            .collect();
        lines.sort_by_key(|l| l.created_at);
        Ok(lines)
    }

    async fn next_order_sequence(&self, day: NaiveDate) -> Result<u64> {
        let mut tables = self.tables();
        let value = tables.sequences.entry(day).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}

/// Transaction over an [`InMemoryStore`].
///
/// Holds the store's writer lock until committed or dropped.
pub struct InMemoryTx {
    _writer: OwnedMutexGuard<()>,
    tables: Arc<Mutex<Tables>>,
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    new_orders: Vec<NewOrder>,
    /// `None` marks a deleted line.
    cart: HashMap<CartLineId, Option<CartLine>>,
}

impl InMemoryTx {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_product(&self, id: ProductId) -> Option<Product> {
        self.products
            .get(&id)
            .cloned()
            .or_else(|| self.tables().products.get(&id).cloned())
    }

    fn current_order(&self, id: OrderId) -> Option<Order> {
        if let Some(order) = self.orders.get(&id) {
            return Some(order.clone());
        }
        if let Some(new) = self.new_orders.iter().find(|n| n.order.id == id) {
            return Some(new.order.clone());
        }
        self.tables().orders.get(&id).cloned()
    }

    fn visible_cart_lines(&self, buyer: UserId) -> Vec<CartLine> {
        let mut lines: HashMap<CartLineId, CartLine> = self
            .tables()
            .cart_lines
            .values()
            .filter(|l| l.buyer_id == buyer)
            .map(|l| (l.id, l.clone()))
            .collect();
        for (id, staged) in &self.cart {
            match staged {
                Some(line) if line.buyer_id == buyer => {
                    lines.insert(*id, line.clone());
                }
                _ => {
                    lines.remove(id);
                }
            }
        }
        let mut lines: Vec<CartLine> = lines.into_values().collect();
        lines.sort_by_key(|l| l.created_at);
        lines
    }

    fn take_injected_conflict(&self, id: ProductId) -> bool {
        take_one(&mut self.tables().cas_conflicts, id)
    }

    fn take_injected_lock_conflict(&self, id: ProductId) -> bool {
        take_one(&mut self.tables().lock_conflicts, id)
    }
}

fn take_one(counters: &mut HashMap<ProductId, u32>, id: ProductId) -> bool {
    match counters.get_mut(&id) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.current_product(id))
    }

    async fn stock_level(&mut self, id: ProductId) -> Result<Option<StockLevel>> {
        Ok(self.current_product(id).map(|p| p.stock_level()))
    }

    async fn shipping_address(&mut self, id: AddressId) -> Result<Option<ShippingAddress>> {
        Ok(self.tables().addresses.get(&id).cloned())
    }

    async fn cart_lines(&mut self, buyer: UserId, selected_only: bool) -> Result<Vec<CartLine>> {
        let mut lines = self.visible_cart_lines(buyer);
        if selected_only {
            lines.retain(|l| l.selected);
        }
        Ok(lines)
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.current_order(id))
    }

    async fn order_items(&mut self, id: OrderId) -> Result<Vec<OrderItem>> {
        if let Some(new) = self.new_orders.iter().find(|n| n.order.id == id) {
            return Ok(new.items.clone());
        }
        Ok(self
            .tables()
            .order_items
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn compare_and_decrease_stock(
        &mut self,
        id: ProductId,
        quantity: u32,
        expected: Version,
    ) -> Result<u64> {
        if self.take_injected_lock_conflict(id) {
            return Err(StoreError::LockConflict(format!(
                "deadlock detected while updating product {id}"
            )));
        }
        if self.take_injected_conflict(id) {
            return Ok(0);
        }
        let Some(mut product) = self.current_product(id) else {
            return Ok(0);
        };
        let quantity = i64::from(quantity);
        if product.version != expected || product.stock < quantity {
            return Ok(0);
        }

        product.stock -= quantity;
        product.version = product.version.next();
        product.status = product.status.after_stock_change(product.stock);
        product.updated_at = Utc::now();
        self.products.insert(id, product);
        Ok(1)
    }

    async fn increase_stock(&mut self, id: ProductId, quantity: u32) -> Result<u64> {
        let Some(mut product) = self.current_product(id) else {
            return Ok(0);
        };
        product.stock += i64::from(quantity);
        product.version = product.version.next();
        product.status = product.status.after_stock_change(product.stock);
        product.updated_at = Utc::now();
        self.products.insert(id, product);
        Ok(1)
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        self.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product_details(
        &mut self,
        id: ProductId,
        seller: UserId,
        name: &str,
        price: Money,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let Some(mut product) = self.current_product(id).filter(|p| p.seller_id == seller) else {
            return Ok(0);
        };
        product.name = name.to_string();
        product.price = price;
        product.version = product.version.next();
        product.updated_at = now;
        self.products.insert(id, product);
        Ok(1)
    }

    async fn set_product_status(
        &mut self,
        id: ProductId,
        seller: UserId,
        status: ProductStatus,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let Some(mut product) = self.current_product(id).filter(|p| p.seller_id == seller) else {
            return Ok(0);
        };
        product.status = status.after_stock_change(product.stock);
        product.version = product.version.next();
        product.updated_at = now;
        self.products.insert(id, product);
        Ok(1)
    }

    async fn upsert_cart_line(&mut self, line: &CartLine) -> Result<()> {
        self.cart.insert(line.id, Some(line.clone()));
        Ok(())
    }

    async fn delete_cart_lines(&mut self, buyer: UserId, ids: &[CartLineId]) -> Result<u64> {
        let visible = self.visible_cart_lines(buyer);
        let mut deleted = 0;
        for line in visible.iter().filter(|l| ids.contains(&l.id)) {
            self.cart.insert(line.id, None);
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<()> {
        self.new_orders.push(order.clone());
        Ok(())
    }

    async fn compare_and_update_order(&mut self, order: &Order, expected: Version) -> Result<u64> {
        match self.current_order(order.id) {
            Some(current) if current.version == expected => {
                self.orders.insert(order.id, order.clone());
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn commit(self) -> Result<()> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        if tables.fail_next_commit {
            tables.fail_next_commit = false;
            return Err(StoreError::Unavailable("commit failed".to_string()));
        }

        tables.products.extend(self.products);
        for (id, staged) in self.cart {
            match staged {
                Some(line) => {
                    tables.cart_lines.insert(id, line);
                }
                None => {
                    tables.cart_lines.remove(&id);
                }
            }
        }
        for new in self.new_orders {
            let id = new.order.id;
            tables.orders.insert(id, new.order);
            tables.order_items.insert(id, new.items);
            tables.order_addresses.insert(id, new.address);
        }
        tables.orders.extend(self.orders);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listed(stock: i64) -> Product {
        let mut product = Product::draft(
            UserId::new(),
            "Lamp",
            Money::from_cents(4_500),
            stock,
            Utc::now(),
        );
        product.status = ProductStatus::OnShelf;
        product
    }

    #[tokio::test]
    async fn test_decrease_is_invisible_until_commit() {
        let store = InMemoryStore::new();
        let product = listed(5);
        store.insert_product(product.clone());

        let mut tx = store.begin().await.unwrap();
        let affected = tx
            .compare_and_decrease_stock(product.id, 2, product.version)
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(store.product(product.id).await.unwrap().unwrap().stock, 5);

        tx.commit().await.unwrap();
        let stored = store.product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 3);
        assert_eq!(stored.version, product.version.next());
    }

    #[tokio::test]
    async fn test_dropped_tx_rolls_back() {
        let store = InMemoryStore::new();
        let product = listed(1);
        store.insert_product(product.clone());

        {
            let mut tx = store.begin().await.unwrap();
            tx.compare_and_decrease_stock(product.id, 1, product.version)
                .await
                .unwrap();
        }

        let stored = store.product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 1);
        assert_eq!(stored.status, ProductStatus::OnShelf);
    }

    #[tokio::test]
    async fn test_stale_version_affects_nothing() {
        let store = InMemoryStore::new();
        let product = listed(5);
        store.insert_product(product.clone());

        let mut tx = store.begin().await.unwrap();
        let affected = tx
            .compare_and_decrease_stock(product.id, 1, product.version.next())
            .await
            .unwrap();
        assert_eq!(affected, 0);
    }

    #[tokio::test]
    async fn test_decrease_to_zero_marks_sold_out_and_increase_relists() {
        let store = InMemoryStore::new();
        let product = listed(2);
        store.insert_product(product.clone());

        let mut tx = store.begin().await.unwrap();
        tx.compare_and_decrease_stock(product.id, 2, product.version)
            .await
            .unwrap();
        assert_eq!(
            tx.product(product.id).await.unwrap().unwrap().status,
            ProductStatus::SoldOut
        );
        tx.increase_stock(product.id, 1).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 1);
        assert_eq!(stored.status, ProductStatus::OnShelf);
        assert_eq!(stored.version, Version::new(2));
    }

    #[tokio::test]
    async fn test_injected_conflicts_are_consumed() {
        let store = InMemoryStore::new();
        let product = listed(5);
        store.insert_product(product.clone());
        store.inject_cas_conflicts(product.id, 1);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.compare_and_decrease_stock(product.id, 1, product.version)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            tx.compare_and_decrease_stock(product.id, 1, product.version)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_injected_lock_conflict_fails_the_write() {
        let store = InMemoryStore::new();
        let product = listed(5);
        store.insert_product(product.clone());
        store.inject_lock_conflicts(product.id, 1);

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .compare_and_decrease_stock(product.id, 1, product.version)
            .await
            .unwrap_err();
        assert!(err.is_lock_conflict());
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.compare_and_decrease_stock(product.id, 1, product.version)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_deleting_consumed_cart_lines_counts_nothing() {
        let store = InMemoryStore::new();
        let buyer = UserId::new();
        let line = CartLine::new(buyer, ProductId::new(), 1, Utc::now());
        store.insert_cart_line(line.clone());

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.delete_cart_lines(buyer, &[line.id]).await.unwrap(), 1);
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.delete_cart_lines(buyer, &[line.id]).await.unwrap(), 0);
        assert_eq!(
            tx.delete_cart_lines(UserId::new(), &[line.id]).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() {
        let store = InMemoryStore::new();
        let product = listed(5);
        store.insert_product(product.clone());
        store.fail_next_commit();

        let mut tx = store.begin().await.unwrap();
        tx.increase_stock(product.id, 10).await.unwrap();
        assert!(tx.commit().await.is_err());
        assert_eq!(store.product(product.id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn test_cart_overlay_reads_own_writes() {
        let store = InMemoryStore::new();
        let buyer = UserId::new();
        let kept = CartLine::new(buyer, ProductId::new(), 1, Utc::now());
        let removed = CartLine::new(buyer, ProductId::new(), 2, Utc::now());
        store.insert_cart_line(kept.clone());
        store.insert_cart_line(removed.clone());

        let mut tx = store.begin().await.unwrap();
        let mut unselected = CartLine::new(buyer, ProductId::new(), 3, Utc::now());
        unselected.selected = false;
        tx.upsert_cart_line(&unselected).await.unwrap();
        assert_eq!(tx.delete_cart_lines(buyer, &[removed.id]).await.unwrap(), 1);

        assert_eq!(tx.cart_lines(buyer, false).await.unwrap().len(), 2);
        assert_eq!(tx.cart_lines(buyer, true).await.unwrap(), vec![kept]);
        assert_eq!(store.cart_lines(buyer).await.unwrap().len(), 2);

        tx.commit().await.unwrap();
        assert_eq!(store.cart_lines(buyer).await.unwrap().len(), 2);
        assert!(
            store
                .cart_lines(buyer)
                .await
                .unwrap()
                .iter()
                .all(|l| l.id != removed.id)
        );
    }

    #[tokio::test]
    async fn test_product_edits_require_owner() {
        let store = InMemoryStore::new();
        let product = listed(0);
        store.insert_product(product.clone());

        let mut tx = store.begin().await.unwrap();
        let stranger = UserId::new();
        assert_eq!(
            tx.update_product_details(product.id, stranger, "x", Money::zero(), Utc::now())
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            tx.set_product_status(
                product.id,
                product.seller_id,
                ProductStatus::OnShelf,
                Utc::now()
            )
            .await
            .unwrap(),
            1
        );
        assert_eq!(
            tx.product(product.id).await.unwrap().unwrap().status,
            ProductStatus::SoldOut
        );
    }

    #[tokio::test]
    async fn test_order_sequence_is_per_day() {
        let store = InMemoryStore::new();
        let today = NaiveDate::from_ymd_opt(2026, 2, 4).unwrap();
        let tomorrow = today.succ_opt().unwrap();

        assert_eq!(store.next_order_sequence(today).await.unwrap(), 1);
        assert_eq!(store.next_order_sequence(today).await.unwrap(), 2);
        assert_eq!(store.next_order_sequence(tomorrow).await.unwrap(), 1);
    }
}
