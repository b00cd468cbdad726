//! Product catalog endpoints, plus operator endpoints for stock and cache.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use cache::ProductDetail;
use common::ProductId;
use domain::{Money, Product};
use fulfillment::{NewProduct, ProductChanges};
use serde::{Deserialize, Serialize};
use store::Store;

use super::{AppState, Caller, parse_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub price_cents: i64,
    pub stock: i64,
}

#[derive(Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub price_cents: Option<i64>,
}

#[derive(Deserialize)]
pub struct StockRequest {
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub seller_id: String,
    pub name: String,
    pub price_cents: i64,
    pub stock: i64,
    pub status: String,
    pub sold_out: bool,
    pub version: i64,
}

impl From<&Product> for ProductResponse {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.to_string(),
            seller_id: product.seller_id.to_string(),
            name: product.name.clone(),
            price_cents: product.price.cents(),
            stock: product.stock,
            status: product.status.to_string(),
            sold_out: product.stock <= 0,
            version: product.version.as_i64(),
        }
    }
}

impl From<ProductDetail> for ProductResponse {
    fn from(detail: ProductDetail) -> Self {
        Self {
            id: detail.id.to_string(),
            seller_id: detail.seller_id.to_string(),
            name: detail.name,
            price_cents: detail.price.cents(),
            stock: detail.stock,
            status: detail.status.to_string(),
            sold_out: detail.sold_out,
            version: detail.version.as_i64(),
        }
    }
}

#[derive(Serialize)]
pub struct StockResponse {
    pub product_id: String,
    pub remaining: i64,
}

/// POST /products: create a draft listing owned by the caller.
#[tracing::instrument(skip(state, req), fields(seller_id = %caller.0))]
pub async fn create<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let product = state
        .catalog
        .publish_product(
            caller.0,
            NewProduct {
                name: req.name,
                price: Money::from_cents(req.price_cents),
                stock: req.stock,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ProductResponse::from(&product))))
}

/// GET /products/{id}: cached product page.
pub async fn get<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    let detail = state.catalog.product_detail(product_id).await?;
    Ok(Json(detail.into()))
}

/// PATCH /products/{id}
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    let changes = ProductChanges {
        name: req.name,
        price: req.price_cents.map(Money::from_cents),
    };
    let product = state
        .catalog
        .update_product(caller.0, product_id, changes)
        .await?;
    Ok(Json(ProductResponse::from(&product)))
}

/// POST /products/{id}/on-shelf
pub async fn on_shelf<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    let product = state.catalog.put_on_shelf(caller.0, product_id).await?;
    Ok(Json(ProductResponse::from(&product)))
}

/// POST /products/{id}/off-shelf
pub async fn off_shelf<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    let product = state.catalog.take_off_shelf(caller.0, product_id).await?;
    Ok(Json(ProductResponse::from(&product)))
}

/// POST /internal/products/{id}/stock/decrease
#[tracing::instrument(skip(state, req))]
pub async fn decrease_stock<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<StockRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    let remaining = state
        .catalog
        .decrease_stock(product_id, req.quantity)
        .await?;
    Ok(Json(StockResponse {
        product_id: product_id.to_string(),
        remaining,
    }))
}

/// POST /internal/products/{id}/stock/release
#[tracing::instrument(skip(state, req))]
pub async fn release_stock<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<StockRequest>,
) -> Result<StatusCode, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    state
        .catalog
        .release_stock(product_id, req.quantity)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /internal/products/{id}/cache/invalidate
pub async fn invalidate_cache<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    state.catalog.invalidate_product_cache(product_id).await;
    Ok(StatusCode::ACCEPTED)
}
