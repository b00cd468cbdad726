//! The caller's shopping cart.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use cache::CartSummary;
use common::{CartLineId, ProductId};
use domain::CartLine;
use fulfillment::CartLineUpdate;
use serde::{Deserialize, Serialize};
use store::Store;

use super::{AppState, Caller, parse_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct SelectAllRequest {
    pub selected: bool,
}

#[derive(Serialize)]
pub struct CartLineResponse {
    pub id: String,
    pub product_id: String,
    pub quantity: u32,
    pub selected: bool,
}

impl From<&CartLine> for CartLineResponse {
    fn from(line: &CartLine) -> Self {
        Self {
            id: line.id.to_string(),
            product_id: line.product_id.to_string(),
            quantity: line.quantity,
            selected: line.selected,
        }
    }
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub line_id: String,
    pub product_id: String,
    pub product_name: String,
    pub price_cents: i64,
    pub quantity: u32,
    pub subtotal_cents: i64,
    pub selected: bool,
    pub stock: i64,
    pub on_shelf: bool,
}

#[derive(Serialize)]
pub struct CartResponse {
    pub items: Vec<CartItemResponse>,
    pub total_quantity: u64,
    pub total_price_cents: i64,
}

impl From<CartSummary> for CartResponse {
    fn from(cart: CartSummary) -> Self {
        Self {
            items: cart
                .items
                .into_iter()
                .map(|item| CartItemResponse {
                    line_id: item.line_id.to_string(),
                    product_id: item.product_id.to_string(),
                    product_name: item.product_name,
                    price_cents: item.price.cents(),
                    quantity: item.quantity,
                    subtotal_cents: item.subtotal.cents(),
                    selected: item.selected,
                    stock: item.stock,
                    on_shelf: item.on_shelf,
                })
                .collect(),
            total_quantity: cart.total_quantity,
            total_price_cents: cart.total_price.cents(),
        }
    }
}

#[derive(Serialize)]
pub struct RemovedResponse {
    pub removed: u64,
}

/// GET /cart
pub async fn get<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.cart(caller.0).await?;
    Ok(Json(cart.into()))
}

/// POST /cart/items
#[tracing::instrument(skip(state, req), fields(buyer_id = %caller.0))]
pub async fn add_item<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartLineResponse>), ApiError> {
    let line = state
        .carts
        .add_to_cart(caller.0, req.product_id, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(CartLineResponse::from(&line))))
}

/// PATCH /cart/items/{line_id}
pub async fn update_item<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(line_id): Path<String>,
    Json(update): Json<CartLineUpdate>,
) -> Result<Json<CartLineResponse>, ApiError> {
    let line_id: CartLineId = parse_id(&line_id, "cart line")?;
    let line = state
        .carts
        .update_cart_line(caller.0, line_id, update)
        .await?;
    Ok(Json(CartLineResponse::from(&line)))
}

/// DELETE /cart/items/{line_id}
pub async fn remove_item<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(line_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let line_id: CartLineId = parse_id(&line_id, "cart line")?;
    state.carts.remove_cart_line(caller.0, line_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /cart/select-all
pub async fn select_all<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<SelectAllRequest>,
) -> Result<StatusCode, ApiError> {
    state.carts.select_all(caller.0, req.selected).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /cart/selected
pub async fn remove_selected<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<RemovedResponse>, ApiError> {
    let removed = state.carts.remove_selected(caller.0).await?;
    Ok(Json(RemovedResponse { removed }))
}

/// DELETE /cart
pub async fn clear<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<RemovedResponse>, ApiError> {
    let removed = state.carts.clear_cart(caller.0).await?;
    Ok(Json(RemovedResponse { removed }))
}
