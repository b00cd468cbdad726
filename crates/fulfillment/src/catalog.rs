//! Seller-side product management and standalone stock adjustments.
//!
//! Every write to a product row is wrapped in a delayed double delete of the
//! product's cache entry.

use std::sync::Arc;

use cache::{CacheBackend, CacheInvalidator, ProductDetail, ProductDetailView, keys};
use common::{Clock, ProductId, SystemClock, UserId};
use domain::{Money, Product, ProductStatus};
use serde::Deserialize;
use store::{Store, StoreTx};

use crate::config::FulfillmentConfig;
use crate::stock::StockDecrementer;
use crate::{FulfillmentError, Result};

/// A product listing to create.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub stock: i64,
}

/// Editable product fields. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub price: Option<Money>,
}

/// Product catalog service.
#[derive(Clone)]
pub struct CatalogService<S: Store + Clone> {
    store: S,
    invalidator: CacheInvalidator,
    stock: StockDecrementer,
    detail: ProductDetailView<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Store + Clone> CatalogService<S> {
    pub fn new(
        store: S,
        cache: Arc<dyn CacheBackend>,
        invalidator: CacheInvalidator,
        config: &FulfillmentConfig,
    ) -> Self {
        Self {
            detail: ProductDetailView::new(store.clone(), cache, config.product_cache_ttl),
            store,
            invalidator,
            stock: StockDecrementer::new(config.stock_retry),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Creates a draft listing owned by `seller_id`.
    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    pub async fn publish_product(&self, seller_id: UserId, product: NewProduct) -> Result<Product> {
        let name = validate_name(&product.name)?;
        validate_price(product.price)?;
        if product.stock < 0 {
            return Err(FulfillmentError::Validation(
                "stock must not be negative".to_string(),
            ));
        }

        let product = Product::draft(seller_id, name, product.price, product.stock, self.clock.now());
        let mut tx = self.store.begin().await?;
        tx.insert_product(&product).await?;
        tx.commit().await?;

        tracing::info!(product_id = %product.id, "product published");
        Ok(product)
    }

    /// Edits name and price. Existing orders keep their frozen prices.
    #[tracing::instrument(skip(self, changes))]
    pub async fn update_product(
        &self,
        seller_id: UserId,
        product_id: ProductId,
        changes: ProductChanges,
    ) -> Result<Product> {
        if let Some(price) = changes.price {
            validate_price(price)?;
        }
        let name = changes.name.as_deref().map(validate_name).transpose()?;

        let guard = self.invalidator.guard(vec![keys::product(product_id)]).await;
        let mut tx = self.store.begin().await?;
        let current = owned_product(&mut tx, seller_id, product_id).await?;
        let name = name.unwrap_or(current.name.as_str()).to_string();
        let price = changes.price.unwrap_or(current.price);
        tx.update_product_details(product_id, seller_id, &name, price, self.clock.now())
            .await?;
        tx.commit().await?;
        guard.finish();

        tracing::info!("product updated");
        self.load(product_id).await
    }

    /// Lists the product. Without stock it is stored as sold out.
    pub async fn put_on_shelf(&self, seller_id: UserId, product_id: ProductId) -> Result<Product> {
        self.set_status(seller_id, product_id, ProductStatus::OnShelf)
            .await
    }

    /// Withdraws the product from sale.
    pub async fn take_off_shelf(&self, seller_id: UserId, product_id: ProductId) -> Result<Product> {
        self.set_status(seller_id, product_id, ProductStatus::OffShelf)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn set_status(
        &self,
        seller_id: UserId,
        product_id: ProductId,
        status: ProductStatus,
    ) -> Result<Product> {
        let guard = self.invalidator.guard(vec![keys::product(product_id)]).await;
        let mut tx = self.store.begin().await?;
        owned_product(&mut tx, seller_id, product_id).await?;
        tx.set_product_status(product_id, seller_id, status, self.clock.now())
            .await?;
        tx.commit().await?;
        guard.finish();

        tracing::info!(status = %status.as_str(), "product status changed");
        self.load(product_id).await
    }

    /// Removes `quantity` units in a transaction of its own.
    ///
    /// Returns the stock left.
    #[tracing::instrument(skip(self))]
    pub async fn decrease_stock(&self, product_id: ProductId, quantity: u32) -> Result<i64> {
        let guard = self.invalidator.guard(vec![keys::product(product_id)]).await;
        let mut tx = self.store.begin().await?;
        let remaining = self.stock.decrease(&mut tx, product_id, quantity).await?;
        tx.commit().await?;
        guard.finish();
        Ok(remaining)
    }

    /// Puts `quantity` units back in a transaction of its own.
    #[tracing::instrument(skip(self))]
    pub async fn release_stock(&self, product_id: ProductId, quantity: u32) -> Result<()> {
        let guard = self.invalidator.guard(vec![keys::product(product_id)]).await;
        let mut tx = self.store.begin().await?;
        self.stock.increase(&mut tx, product_id, quantity).await?;
        tx.commit().await?;
        guard.finish();
        Ok(())
    }

    /// Drops the cached product detail now and again after the delay.
    pub async fn invalidate_product_cache(&self, product_id: ProductId) {
        self.invalidator
            .guard(vec![keys::product(product_id)])
            .await
            .finish();
    }

    /// Product page, served from cache when possible.
    pub async fn product_detail(&self, product_id: ProductId) -> Result<ProductDetail> {
        self.detail
            .get(product_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("product", product_id))
    }

    async fn load(&self, product_id: ProductId) -> Result<Product> {
        self.store
            .product(product_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("product", product_id))
    }
}

async fn owned_product<T: StoreTx>(
    tx: &mut T,
    seller_id: UserId,
    product_id: ProductId,
) -> Result<Product> {
    let product = tx
        .product(product_id)
        .await?
        .ok_or_else(|| FulfillmentError::not_found("product", product_id))?;
    if product.seller_id != seller_id {
        return Err(FulfillmentError::Authorization(format!(
            "product {product_id} belongs to another seller"
        )));
    }
    Ok(product)
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(FulfillmentError::Validation(
            "product name must not be empty".to_string(),
        ));
    }
    Ok(name)
}

fn validate_price(price: Money) -> Result<()> {
    if price.is_negative() {
        return Err(FulfillmentError::Validation(
            "price must not be negative".to_string(),
        ));
    }
    Ok(())
}
