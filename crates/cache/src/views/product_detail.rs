//! Product detail view, cached per product.

use std::sync::Arc;
use std::time::Duration;

use common::{ProductId, UserId, Version};
use domain::{Money, Product, ProductStatus};
use serde::{Deserialize, Serialize};
use store::Store;

use super::read_through;
use crate::{CacheBackend, Result, keys};

/// What buyers see on a product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetail {
    pub id: ProductId,
    pub seller_id: UserId,
    pub name: String,
    pub price: Money,
    pub stock: i64,
    pub status: ProductStatus,
    pub sold_out: bool,
    pub version: Version,
}

impl From<Product> for ProductDetail {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            seller_id: product.seller_id,
            name: product.name,
            price: product.price,
            stock: product.stock,
            sold_out: product.status == ProductStatus::SoldOut,
            status: product.status,
            version: product.version,
        }
    }
}

/// Read-through view over `product:{id}`.
#[derive(Clone)]
pub struct ProductDetailView<S: Store + Clone> {
    store: S,
    cache: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl<S: Store + Clone> ProductDetailView<S> {
    pub fn new(store: S, cache: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: ProductId) -> Result<Option<ProductDetail>> {
        read_through(
            self.cache.as_ref(),
            "product_detail",
            &keys::product(id),
            self.ttl,
            || async move { Ok(self.store.product(id).await?.map(ProductDetail::from)) },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryCache;
    use chrono::Utc;
    use store::{InMemoryStore, StoreTx};

    const TTL: Duration = Duration::from_secs(30 * 60);

    fn setup() -> (InMemoryStore, InMemoryCache, ProductDetailView<InMemoryStore>, Product) {
        let store = InMemoryStore::new();
        let cache = InMemoryCache::new();
        let mut product = Product::draft(
            UserId::new(),
            "Teapot",
            Money::from_cents(12_800),
            4,
            Utc::now(),
        );
        product.status = ProductStatus::OnShelf;
        store.insert_product(product.clone());
        let view = ProductDetailView::new(store.clone(), Arc::new(cache.clone()), TTL);
        (store, cache, view, product)
    }

    #[tokio::test]
    async fn test_miss_populates_cache() {
        let (_, cache, view, product) = setup();

        let detail = view.get(product.id).await.unwrap().unwrap();
        assert_eq!(detail.stock, 4);
        assert!(cache.contains(&keys::product(product.id)).await);
    }

    #[tokio::test]
    async fn test_hit_serves_cached_copy_until_deleted() {
        let (store, cache, view, product) = setup();
        view.get(product.id).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.increase_stock(product.id, 6).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(view.get(product.id).await.unwrap().unwrap().stock, 4);
        cache.delete(&keys::product(product.id)).await.unwrap();
        assert_eq!(view.get(product.id).await.unwrap().unwrap().stock, 10);
    }

    #[tokio::test]
    async fn test_missing_product_is_not_cached() {
        let (_, cache, view, _) = setup();
        let id = ProductId::new();
        assert!(view.get(id).await.unwrap().is_none());
        assert!(!cache.contains(&keys::product(id)).await);
    }

    #[tokio::test]
    async fn test_unavailable_cache_falls_back_to_store() {
        let (_, cache, view, product) = setup();
        cache.set_unavailable(true);
        let detail = view.get(product.id).await.unwrap().unwrap();
        assert_eq!(detail.id, product.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_thirty_minutes() {
        let (_, cache, view, product) = setup();
        view.get(product.id).await.unwrap();
        let key = keys::product(product.id);
        assert_eq!(cache.ttl(&key).await, Some(TTL));

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert!(!cache.contains(&key).await);
    }
}
