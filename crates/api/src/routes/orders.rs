//! Order placement and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{AddressId, CartLineId, OrderId, ProductId};
use domain::{Order, OrderStatus};
use fulfillment::{CreateOrder, OrderDetails, SelectedItem};
use serde::{Deserialize, Serialize};
use store::Store;

use super::{AppState, Caller, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub address_id: AddressId,
    pub items: Vec<OrderItemRequest>,
    pub target_currency: Option<String>,
    pub remark: Option<String>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub cart_line_id: Option<CartLineId>,
}

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub address_id: AddressId,
    pub target_currency: Option<String>,
    pub remark: Option<String>,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Seller,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub role: Option<Role>,
    pub status: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub status: String,
    pub payment_status: String,
    pub product_amount_cents: i64,
    pub freight_amount_cents: i64,
    pub discount_amount_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub target_currency: Option<String>,
    pub exchange_rate: String,
    pub converted_amount_cents: i64,
    pub remark: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: String,
    pub payment_time: Option<String>,
    pub ship_time: Option<String>,
    pub complete_time: Option<String>,
    pub cancel_time: Option<String>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            order_number: order.order_number.to_string(),
            buyer_id: order.buyer_id.to_string(),
            seller_id: order.seller_id.to_string(),
            status: order.status.to_string(),
            payment_status: order.payment_status.as_str().to_string(),
            product_amount_cents: order.product_amount.cents(),
            freight_amount_cents: order.freight_amount.cents(),
            discount_amount_cents: order.discount_amount.cents(),
            total_cents: order.total_amount.cents(),
            currency: order.currency.clone(),
            target_currency: order.target_currency.clone(),
            exchange_rate: order.exchange_rate.to_string(),
            converted_amount_cents: order.converted_amount.cents(),
            remark: order.remark.clone(),
            cancel_reason: order.cancel_reason.clone(),
            created_at: order.created_at.to_rfc3339(),
            payment_time: order.payment_time.map(|t| t.to_rfc3339()),
            ship_time: order.ship_time.map(|t| t.to_rfc3339()),
            complete_time: order.complete_time.map(|t| t.to_rfc3339()),
            cancel_time: order.cancel_time.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
}

#[derive(Serialize)]
pub struct AddressResponse {
    pub recipient_name: String,
    pub phone: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub detail: String,
}

#[derive(Serialize)]
pub struct OrderDetailsResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
    pub address: Option<AddressResponse>,
}

impl From<OrderDetails> for OrderDetailsResponse {
    fn from(details: OrderDetails) -> Self {
        Self {
            order: OrderResponse::from(&details.order),
            items: details
                .items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.to_string(),
                    product_name: item.product_name,
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                    subtotal_cents: item.subtotal.cents(),
                })
                .collect(),
            address: details.address.map(|a| AddressResponse {
                recipient_name: a.recipient_name,
                phone: a.phone,
                province: a.province,
                city: a.city,
                district: a.district,
                detail: a.detail,
            }),
        }
    }
}

// -- Handlers --

/// POST /orders: place an order for explicitly selected products.
#[tracing::instrument(skip(state, req), fields(buyer_id = %caller.0))]
pub async fn create<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let request = CreateOrder {
        buyer_id: caller.0,
        address_id: req.address_id,
        items: req
            .items
            .into_iter()
            .map(|item| SelectedItem {
                product_id: item.product_id,
                quantity: item.quantity,
                cart_line_id: item.cart_line_id,
            })
            .collect(),
        target_currency: req.target_currency,
        remark: req.remark,
    };
    let order = state.orders.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// POST /orders/checkout: place an order for the selected cart lines.
#[tracing::instrument(skip(state, req), fields(buyer_id = %caller.0))]
pub async fn checkout<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state
        .orders
        .checkout_cart(caller.0, req.address_id, req.target_currency, req.remark)
        .await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders: the caller's orders as buyer (default) or seller.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse::<OrderStatus>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))
        })
        .transpose()?;
    let orders = match query.role.unwrap_or(Role::Buyer) {
        Role::Buyer => state.orders.buyer_orders(caller.0, status).await?,
        Role::Seller => state.orders.seller_orders(caller.0, status).await?,
    };
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderDetailsResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let details = state.orders.get_order(caller.0, order_id).await?;
    Ok(Json(details.into()))
}

/// GET /orders/by-number/{number}
#[tracing::instrument(skip(state))]
pub async fn get_by_number<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(number): Path<String>,
) -> Result<Json<OrderDetailsResponse>, ApiError> {
    let details = state.orders.get_order_by_number(caller.0, &number).await?;
    Ok(Json(details.into()))
}

/// POST /orders/{id}/pay
#[tracing::instrument(skip(state))]
pub async fn pay<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = state.orders.pay_order(caller.0, order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    req: Option<Json<CancelRequest>>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let reason = req.and_then(|Json(body)| body.reason);
    let order = state
        .orders
        .cancel_order(caller.0, order_id, reason.as_deref())
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/ship
#[tracing::instrument(skip(state))]
pub async fn ship<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = state.orders.ship_order(caller.0, order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/confirm
#[tracing::instrument(skip(state))]
pub async fn confirm<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = state.orders.confirm_order(caller.0, order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}
