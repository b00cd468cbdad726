//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and need a Docker daemon.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use common::{AddressId, OrderId, UserId, Version};
use domain::{
    Amounts, Money, Order, OrderAction, OrderItem, OrderNumber, OrderStatus, Product,
    ProductStatus, ShippingAddress,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use store::{NewOrder, PostgresStore, Store, StoreTx};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_marketplace_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/002_create_order_timeout_tasks.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_addresses, order_items, orders, cart_lines, \
         shipping_addresses, products, order_sequences, order_timeout_tasks",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

async fn seed_product(store: &PostgresStore, stock: i64) -> Product {
    let mut product = Product::draft(
        UserId::new(),
        "Thermos",
        Money::from_cents(3_900),
        stock,
        Utc::now(),
    );
    product.status = ProductStatus::OnShelf;
    let mut tx = store.begin().await.unwrap();
    tx.insert_product(&product).await.unwrap();
    tx.commit().await.unwrap();
    product
}

fn new_order(product: &Product, buyer: UserId, quantity: u32) -> NewOrder {
    let id = OrderId::new();
    let now = Utc::now();
    let item = OrderItem::new(id, product.id, &product.name, product.price, quantity);
    let order = Order::place(
        id,
        OrderNumber::generate(now, buyer, 1),
        buyer,
        product.seller_id,
        Amounts {
            product: item.subtotal,
            freight: Money::zero(),
            discount: Money::zero(),
        },
        "CNY",
        None,
        Decimal::ONE,
        None,
        now,
    )
    .unwrap();
    let address = ShippingAddress {
        id: AddressId::new(),
        user_id: buyer,
        recipient_name: "Han Meimei".to_string(),
        phone: "13900000000".to_string(),
        province: "Guangdong".to_string(),
        city: "Shenzhen".to_string(),
        district: "Nanshan".to_string(),
        detail: "8 Bay Road".to_string(),
    };
    NewOrder {
        address: address.snapshot_for(id),
        order,
        items: vec![item],
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn conditional_decrement_checks_version_and_stock() {
    let store = get_test_store().await;
    let product = seed_product(&store, 3).await;

    let mut tx = store.begin().await.unwrap();
    assert_eq!(
        tx.compare_and_decrease_stock(product.id, 4, product.version)
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        tx.compare_and_decrease_stock(product.id, 3, product.version)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        tx.compare_and_decrease_stock(product.id, 1, product.version)
            .await
            .unwrap(),
        0
    );
    tx.commit().await.unwrap();

    let stored = store.product(product.id).await.unwrap().unwrap();
    assert_eq!(stored.stock, 0);
    assert_eq!(stored.status, ProductStatus::SoldOut);
    assert_eq!(stored.version, product.version.next());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn concurrent_decrements_never_oversell() {
    let store = get_test_store().await;
    let product = seed_product(&store, 3).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut tx = store.begin().await.unwrap();
            let level = tx.stock_level(product.id).await.unwrap().unwrap();
            if !level.covers(1) {
                return false;
            }
            let affected = tx
                .compare_and_decrease_stock(product.id, 1, level.version)
                .await
                .unwrap();
            tx.commit().await.unwrap();
            affected == 1
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap() {
            succeeded += 1;
        }
    }

    let stored = store.product(product.id).await.unwrap().unwrap();
    assert!(succeeded <= 3);
    assert_eq!(stored.stock, 3 - succeeded);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn rolled_back_order_leaves_no_rows() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;
    let order = new_order(&product, UserId::new(), 2);

    {
        let mut tx = store.begin().await.unwrap();
        tx.compare_and_decrease_stock(product.id, 2, product.version)
            .await
            .unwrap();
        tx.insert_order(&order).await.unwrap();
    }

    assert!(store.order(order.order.id).await.unwrap().is_none());
    assert_eq!(store.product(product.id).await.unwrap().unwrap().stock, 5);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn order_round_trip_and_conditional_update() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;
    let buyer = UserId::new();
    let new = new_order(&product, buyer, 2);

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&new).await.unwrap();
    tx.commit().await.unwrap();

    let stored = store.order(new.order.id).await.unwrap().unwrap();
    assert_eq!(stored.order_number, new.order.order_number);
    assert_eq!(stored.status, OrderStatus::PendingPayment);
    assert_eq!(stored.total_amount, new.order.total_amount);
    assert_eq!(stored.exchange_rate, Decimal::ONE);
    assert_eq!(stored.version, Version::first());
    assert_eq!(store.order_items(new.order.id).await.unwrap(), new.items);
    assert_eq!(
        store.order_address(new.order.id).await.unwrap(),
        Some(new.address.clone())
    );
    assert_eq!(
        store
            .order_by_number(&new.order.order_number)
            .await
            .unwrap()
            .map(|o| o.id),
        Some(new.order.id)
    );

    let paid = stored.apply(OrderAction::Pay, Utc::now(), None).unwrap().order;
    let mut tx = store.begin().await.unwrap();
    assert_eq!(
        tx.compare_and_update_order(&paid, Version::first())
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        tx.compare_and_update_order(&paid, Version::first())
            .await
            .unwrap(),
        0
    );
    tx.commit().await.unwrap();

    let pending = store
        .orders_for_buyer(buyer, Some(OrderStatus::PendingPayment))
        .await
        .unwrap();
    assert!(pending.is_empty());
    let shipping = store
        .orders_for_seller(product.seller_id, Some(OrderStatus::PendingShipment))
        .await
        .unwrap();
    assert_eq!(shipping.len(), 1);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn expired_pending_orders_respects_deadline() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;
    let new = new_order(&product, UserId::new(), 1);

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&new).await.unwrap();
    tx.commit().await.unwrap();

    let created = store.order(new.order.id).await.unwrap().unwrap().created_at;
    assert!(
        store
            .expired_pending_orders(created - Duration::seconds(1), 10)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        store
            .expired_pending_orders(created + Duration::minutes(15), 10)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
#[ignore = "requires docker"]
async fn order_sequence_counts_per_day() {
    let store = get_test_store().await;
    let day = NaiveDate::from_ymd_opt(2026, 2, 4).unwrap();

    assert_eq!(store.next_order_sequence(day).await.unwrap(), 1);
    assert_eq!(store.next_order_sequence(day).await.unwrap(), 2);
    assert_eq!(
        store
            .next_order_sequence(day.succ_opt().unwrap())
            .await
            .unwrap(),
        1
    );
}
