use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{AddressId, CartLineId, OrderId, ProductId, UserId, Version};
use domain::{
    CartLine, Money, Order, OrderAddress, OrderItem, OrderNumber, OrderStatus, Product,
    ProductStatus, ShippingAddress, StockLevel,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::error::{lock_conflict_or_database, to_u32};
use crate::{NewOrder, Result, Store, StoreTx};

const PRODUCT_COLUMNS: &str =
    "id, seller_id, name, price_cents, stock, status, version, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, order_number, buyer_id, seller_id, status, payment_status, \
     product_amount_cents, freight_amount_cents, discount_amount_cents, total_amount_cents, \
     currency, target_currency, exchange_rate, converted_amount_cents, remark, cancel_reason, \
     created_at, updated_at, payment_time, ship_time, complete_time, cancel_time, version";

const CART_COLUMNS: &str = "id, buyer_id, product_id, quantity, selected, created_at, updated_at";

const ITEM_COLUMNS: &str =
    "order_id, product_id, product_name, unit_price_cents, quantity, subtotal_cents";

const ADDRESS_COLUMNS: &str = "recipient_name, phone, province, city, district, detail";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    async fn orders_where(
        &self,
        column: &str,
        party: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE {column} = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC"
        ))
        .bind(party.as_uuid())
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_order).collect()
    }
}

fn row_to_product(row: PgRow) -> Result<Product> {
    let status: String = row.try_get("status")?;
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
        name: row.try_get("name")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        stock: row.try_get("stock")?,
        status: status.parse::<ProductStatus>()?,
        version: Version::new(row.try_get("version")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order(row: PgRow) -> Result<Order> {
    let number: String = row.try_get("order_number")?;
    let status: String = row.try_get("status")?;
    let payment_status: String = row.try_get("payment_status")?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_number: OrderNumber::parse(&number)?,
        buyer_id: UserId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
        seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
        status: status.parse::<OrderStatus>()?,
        payment_status: payment_status.parse()?,
        product_amount: Money::from_cents(row.try_get("product_amount_cents")?),
        freight_amount: Money::from_cents(row.try_get("freight_amount_cents")?),
        discount_amount: Money::from_cents(row.try_get("discount_amount_cents")?),
        total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
        currency: row.try_get("currency")?,
        target_currency: row.try_get("target_currency")?,
        exchange_rate: row.try_get("exchange_rate")?,
        converted_amount: Money::from_cents(row.try_get("converted_amount_cents")?),
        remark: row.try_get("remark")?,
        cancel_reason: row.try_get("cancel_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        payment_time: row.try_get("payment_time")?,
        ship_time: row.try_get("ship_time")?,
        complete_time: row.try_get("complete_time")?,
        cancel_time: row.try_get("cancel_time")?,
        version: Version::new(row.try_get("version")?),
    })
}

fn row_to_item(row: PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        product_name: row.try_get("product_name")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        quantity: to_u32("quantity", row.try_get("quantity")?)?,
        subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
    })
}

fn row_to_cart_line(row: PgRow) -> Result<CartLine> {
    Ok(CartLine {
        id: CartLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
        buyer_id: UserId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: to_u32("quantity", row.try_get("quantity")?)?,
        selected: row.try_get("selected")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order_address(order_id: OrderId, row: PgRow) -> Result<OrderAddress> {
    Ok(OrderAddress {
        order_id,
        recipient_name: row.try_get("recipient_name")?,
        phone: row.try_get("phone")?,
        province: row.try_get("province")?,
        city: row.try_get("city")?,
        district: row.try_get("district")?,
        detail: row.try_get("detail")?,
    })
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx> {
        Ok(PostgresTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_product).transpose()
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_order).transpose()
    }

    async fn order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
        ))
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_order).transpose()
    }

    async fn order_items(&self, id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY position ASC"
        ))
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_item).collect()
    }

    async fn order_address(&self, id: OrderId) -> Result<Option<OrderAddress>> {
        let row = sqlx::query(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM order_addresses WHERE order_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_order_address(id, r)).transpose()
    }

    async fn orders_for_buyer(
        &self,
        buyer: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        self.orders_where("buyer_id", buyer, status).await
    }

    async fn orders_for_seller(
        &self,
        seller: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        self.orders_where("seller_id", seller, status).await
    }

    async fn expired_pending_orders(
        &self,
        deadline: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE status = $1 AND created_at <= $2 \
             ORDER BY created_at ASC LIMIT $3"
        ))
        .bind(OrderStatus::PendingPayment.as_str())
        .bind(deadline)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_order).collect()
    }

    async fn cart_lines(&self, buyer: UserId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM cart_lines WHERE buyer_id = $1 ORDER BY created_at ASC"
        ))
        .bind(buyer.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_cart_line).collect()
    }

    async fn next_order_sequence(&self, day: NaiveDate) -> Result<u64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO order_sequences (day, value) VALUES ($1, 1)
            ON CONFLICT (day) DO UPDATE SET value = order_sequences.value + 1
            RETURNING value
            "#,
        )
        .bind(day)
        .fetch_one(&self.pool)
        .await?;

        Ok(value.unsigned_abs())
    }
}

/// Transaction over a [`PostgresStore`].
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_product).transpose()
    }

    async fn stock_level(&mut self, id: ProductId) -> Result<Option<StockLevel>> {
        let row = sqlx::query("SELECT stock, version FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(|r| {
            Ok(StockLevel {
                product_id: id,
                stock: r.try_get("stock")?,
                version: Version::new(r.try_get("version")?),
            })
        })
        .transpose()
    }

    async fn shipping_address(&mut self, id: AddressId) -> Result<Option<ShippingAddress>> {
        let row = sqlx::query(&format!(
            "SELECT id, user_id, {ADDRESS_COLUMNS} FROM shipping_addresses WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(|r| {
            Ok(ShippingAddress {
                id: AddressId::from_uuid(r.try_get::<Uuid, _>("id")?),
                user_id: UserId::from_uuid(r.try_get::<Uuid, _>("user_id")?),
                recipient_name: r.try_get("recipient_name")?,
                phone: r.try_get("phone")?,
                province: r.try_get("province")?,
                city: r.try_get("city")?,
                district: r.try_get("district")?,
                detail: r.try_get("detail")?,
            })
        })
        .transpose()
    }

    async fn cart_lines(&mut self, buyer: UserId, selected_only: bool) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM cart_lines \
             WHERE buyer_id = $1 AND (selected OR NOT $2) ORDER BY created_at ASC"
        ))
        .bind(buyer.as_uuid())
        .bind(selected_only)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_cart_line).collect()
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(row_to_order).transpose()
    }

    async fn order_items(&mut self, id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY position ASC"
        ))
        .bind(id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_item).collect()
    }

    async fn compare_and_decrease_stock(
        &mut self,
        id: ProductId,
        quantity: u32,
        expected: Version,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $2,
                version = version + 1,
                status = CASE WHEN status = 'on_shelf' AND stock - $2 = 0
                              THEN 'sold_out' ELSE status END,
                updated_at = now()
            WHERE id = $1 AND version = $3 AND stock >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .bind(expected.as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(lock_conflict_or_database)?;

        Ok(result.rows_affected())
    }

    async fn increase_stock(&mut self, id: ProductId, quantity: u32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock + $2,
                version = version + 1,
                status = CASE WHEN status = 'sold_out' AND stock + $2 > 0
                              THEN 'on_shelf' ELSE status END,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&mut *self.tx)
        .await
        .map_err(lock_conflict_or_database)?;

        Ok(result.rows_affected())
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(product.id.as_uuid())
        .bind(product.seller_id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.stock)
        .bind(product.status.as_str())
        .bind(product.version.as_i64())
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await?;

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
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $3, price_cents = $4, version = version + 1, updated_at = $5
            WHERE id = $1 AND seller_id = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(seller.as_uuid())
        .bind(name)
        .bind(price.cents())
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_product_status(
        &mut self,
        id: ProductId,
        seller: UserId,
        status: ProductStatus,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET status = CASE WHEN $3::text = 'on_shelf' AND stock = 0 THEN 'sold_out'
                              WHEN $3::text = 'sold_out' AND stock > 0 THEN 'on_shelf'
                              ELSE $3::text END,
                version = version + 1,
                updated_at = $4
            WHERE id = $1 AND seller_id = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(seller.as_uuid())
        .bind(status.as_str())
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn upsert_cart_line(&mut self, line: &CartLine) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO cart_lines ({CART_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE \
             SET quantity = EXCLUDED.quantity, selected = EXCLUDED.selected, \
                 updated_at = EXCLUDED.updated_at"
        ))
        .bind(line.id.as_uuid())
        .bind(line.buyer_id.as_uuid())
        .bind(line.product_id.as_uuid())
        .bind(i64::from(line.quantity))
        .bind(line.selected)
        .bind(line.created_at)
        .bind(line.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_cart_lines(&mut self, buyer: UserId, ids: &[CartLineId]) -> Result<u64> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let result = sqlx::query("DELETE FROM cart_lines WHERE buyer_id = $1 AND id = ANY($2)")
            .bind(buyer.as_uuid())
            .bind(&ids)
            .execute(&mut *self.tx)
            .await
            .map_err(lock_conflict_or_database)?;

        Ok(result.rows_affected())
    }

    async fn insert_order(&mut self, new: &NewOrder) -> Result<()> {
        let order = &new.order;
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
              $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)"
        ))
        .bind(order.id.as_uuid())
        .bind(order.order_number.as_str())
        .bind(order.buyer_id.as_uuid())
        .bind(order.seller_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.product_amount.cents())
        .bind(order.freight_amount.cents())
        .bind(order.discount_amount.cents())
        .bind(order.total_amount.cents())
        .bind(&order.currency)
        .bind(&order.target_currency)
        .bind(order.exchange_rate)
        .bind(order.converted_amount.cents())
        .bind(&order.remark)
        .bind(&order.cancel_reason)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.payment_time)
        .bind(order.ship_time)
        .bind(order.complete_time)
        .bind(order.cancel_time)
        .bind(order.version.as_i64())
        .execute(&mut *self.tx)
        .await?;

        for (position, item) in new.items.iter().enumerate() {
            sqlx::query(&format!(
                "INSERT INTO order_items (position, {ITEM_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
            ))
            .bind(position as i32)
            .bind(item.order_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(&item.product_name)
            .bind(item.unit_price.cents())
            .bind(i64::from(item.quantity))
            .bind(item.subtotal.cents())
            .execute(&mut *self.tx)
            .await?;
        }

        let address = &new.address;
        sqlx::query(&format!(
            "INSERT INTO order_addresses (order_id, {ADDRESS_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(address.order_id.as_uuid())
        .bind(&address.recipient_name)
        .bind(&address.phone)
        .bind(&address.province)
        .bind(&address.city)
        .bind(&address.district)
        .bind(&address.detail)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn compare_and_update_order(&mut self, order: &Order, expected: Version) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, payment_status = $4, cancel_reason = $5, updated_at = $6,
                payment_time = $7, ship_time = $8, complete_time = $9, cancel_time = $10,
                version = $11
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(expected.as_i64())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.cancel_reason)
        .bind(order.updated_at)
        .bind(order.payment_time)
        .bind(order.ship_time)
        .bind(order.complete_time)
        .bind(order.cancel_time)
        .bind(order.version.as_i64())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
