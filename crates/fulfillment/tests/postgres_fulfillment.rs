//! Fulfillment over PostgreSQL: real row-level compare-and-swap and the
//! durable delay queue.
//!
//! Needs a Docker daemon. Run with:
//!
//! ```bash
//! cargo test -p fulfillment --test postgres_fulfillment -- --ignored --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use cache::{CacheInvalidator, InMemoryCache};
use chrono::Utc;
use common::{AddressId, UserId};
use domain::{CartLine, Money, OrderNumber, OrderStatus, Product, ProductStatus, ShippingAddress};
use fulfillment::{
    CancellationTask, CreateOrder, DelayQueue, FulfillmentConfig, FulfillmentError, OrderService,
    PostgresDelayQueue, SelectedItem,
};
use sqlx::PgPool;
use store::{PostgresStore, Store, StoreTx};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

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

async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
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
    pool
}

async fn seed_product(store: &PostgresStore, seller: UserId, stock: i64) -> Product {
    let mut product = Product::draft(seller, "Vase", Money::from_cents(6_600), stock, Utc::now());
    product.status = ProductStatus::OnShelf;
    let mut tx = store.begin().await.unwrap();
    tx.insert_product(&product).await.unwrap();
    tx.commit().await.unwrap();
    product
}

async fn seed_buyer(pool: &PgPool) -> (UserId, AddressId) {
    let buyer = UserId::new();
    let address = ShippingAddress {
        id: AddressId::new(),
        user_id: buyer,
        recipient_name: "Wang Fang".to_string(),
        phone: "13700000000".to_string(),
        province: "Sichuan".to_string(),
        city: "Chengdu".to_string(),
        district: "Jinjiang".to_string(),
        detail: "3 Jinli Street".to_string(),
    };
    sqlx::query(
        "INSERT INTO shipping_addresses \
         (id, user_id, recipient_name, phone, province, city, district, detail) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(address.id.as_uuid())
    .bind(buyer.as_uuid())
    .bind(&address.recipient_name)
    .bind(&address.phone)
    .bind(&address.province)
    .bind(&address.city)
    .bind(&address.district)
    .bind(&address.detail)
    .execute(pool)
    .await
    .unwrap();
    (buyer, address.id)
}

fn service(pool: &PgPool) -> (PostgresStore, PostgresDelayQueue, OrderService<PostgresStore>) {
    let store = PostgresStore::new(pool.clone());
    let queue = PostgresDelayQueue::new(pool.clone()).with_poll_interval(Duration::from_millis(20));
    let invalidator =
        CacheInvalidator::new(Arc::new(InMemoryCache::new()), Duration::from_millis(500));
    let orders = OrderService::new(
        store.clone(),
        Arc::new(queue.clone()),
        invalidator,
        FulfillmentConfig::default(),
    );
    (store, queue, orders)
}

fn one_item(buyer: UserId, address: AddressId, product: &Product) -> CreateOrder {
    CreateOrder {
        buyer_id: buyer,
        address_id: address,
        items: vec![SelectedItem {
            product_id: product.id,
            quantity: 1,
            cart_line_id: None,
        }],
        target_currency: None,
        remark: None,
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn concurrent_orders_sell_exactly_the_stock() {
    let pool = get_test_pool().await;
    let (store, queue, orders) = service(&pool);
    let product = seed_product(&store, UserId::new(), 4).await;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let (buyer, address) = seed_buyer(&pool).await;
        let orders = orders.clone();
        let request = one_item(buyer, address, &product);
        handles.push(tokio::spawn(async move { orders.create_order(request).await }));
    }

    let mut placed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            // Lost races that ran out of retries are fine, overselling is not.
            Err(FulfillmentError::StockInsufficient { .. })
            | Err(FulfillmentError::StockContention { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let stored = store.product(product.id).await.unwrap().unwrap();
    assert!(placed <= 4);
    assert_eq!(stored.stock, 4 - placed);
    assert_eq!(queue.len().await.unwrap(), placed as usize);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn opposite_item_orders_do_not_deadlock() {
    let pool = get_test_pool().await;
    let (store, queue, orders) = service(&pool);
    let seller = UserId::new();
    let vase = seed_product(&store, seller, 100).await;
    let bowl = seed_product(&store, seller, 100).await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let (buyer, address) = seed_buyer(&pool).await;
        let (first, second) = if i % 2 == 0 { (&vase, &bowl) } else { (&bowl, &vase) };
        let mut request = one_item(buyer, address, first);
        request.items.push(SelectedItem {
            product_id: second.id,
            quantity: 1,
            cart_line_id: None,
        });
        let orders = orders.clone();
        handles.push(tokio::spawn(async move { orders.create_order(request).await }));
    }

    let mut placed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(FulfillmentError::StockContention { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert!(placed > 0);
    for product in [&vase, &bowl] {
        let stored = store.product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 100 - placed);
    }
    assert_eq!(queue.len().await.unwrap(), placed as usize);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn concurrent_checkouts_of_one_cart_place_one_order() {
    let pool = get_test_pool().await;
    let (store, queue, orders) = service(&pool);
    let product = seed_product(&store, UserId::new(), 10).await;
    let (buyer, address) = seed_buyer(&pool).await;
    let mut tx = store.begin().await.unwrap();
    tx.upsert_cart_line(&CartLine::new(buyer, product.id, 2, Utc::now()))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let orders = orders.clone();
        handles.push(tokio::spawn(async move {
            orders.checkout_cart(buyer, address, None, None).await
        }));
    }

    let mut placed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(FulfillmentError::StateConflict(_) | FulfillmentError::Validation(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(placed, 1);
    let stored = store.product(product.id).await.unwrap().unwrap();
    assert_eq!(stored.stock, 8);
    assert_eq!(queue.len().await.unwrap(), 1);
    assert!(store.cart_lines(buyer).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn payment_removes_durable_task() {
    let pool = get_test_pool().await;
    let (store, queue, orders) = service(&pool);
    let product = seed_product(&store, UserId::new(), 2).await;
    let (buyer, address) = seed_buyer(&pool).await;

    let order = orders
        .create_order(one_item(buyer, address, &product))
        .await
        .unwrap();
    assert_eq!(queue.len().await.unwrap(), 1);

    orders.pay_order(buyer, order.id).await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 0);
    assert_eq!(
        store.order(order.id).await.unwrap().unwrap().status,
        OrderStatus::PendingShipment
    );
}

#[tokio::test]
#[ignore = "requires docker"]
async fn due_task_is_claimed_once() {
    let pool = get_test_pool().await;
    let queue = PostgresDelayQueue::new(pool.clone()).with_poll_interval(Duration::from_millis(20));
    let buyer = UserId::new();
    let task = CancellationTask {
        order_id: common::OrderId::new(),
        order_number: OrderNumber::generate(Utc::now(), buyer, 1),
        buyer_id: buyer,
        created_at: Utc::now(),
    };

    queue.offer(task.clone(), Duration::from_secs(3600)).await.unwrap();
    assert!(queue.poll_due(Duration::from_millis(50)).await.unwrap().is_none());

    queue.offer(task.clone(), Duration::ZERO).await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 1);

    let (a, b) = tokio::join!(
        queue.poll_due(Duration::from_millis(100)),
        queue.poll_due(Duration::from_millis(100)),
    );
    let claimed: Vec<_> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
    assert_eq!(claimed, vec![task.clone()]);
    assert!(!queue.remove(&task).await.unwrap());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn timeout_cancellation_restores_stock() {
    let pool = get_test_pool().await;
    let (store, _, orders) = service(&pool);
    let product = seed_product(&store, UserId::new(), 3).await;
    let (buyer, address) = seed_buyer(&pool).await;

    let order = orders
        .create_order(one_item(buyer, address, &product))
        .await
        .unwrap();
    assert!(orders.cancel_timeout_order(order.id).await.unwrap());
    assert!(!orders.cancel_timeout_order(order.id).await.unwrap());

    assert_eq!(store.product(product.id).await.unwrap().unwrap().stock, 3);
}
