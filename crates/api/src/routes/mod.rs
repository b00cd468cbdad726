//! HTTP route handlers and the state they share.

pub mod carts;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use fulfillment::{CartService, CatalogService, DelayQueue, OrderService};
use cache::CacheInvalidator;
use store::Store;

use crate::error::ApiError;

/// Header carrying the authenticated user id, set by the gateway.
pub const CALLER_HEADER: &str = "x-user-id";

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store + Clone> {
    pub orders: OrderService<S>,
    pub catalog: CatalogService<S>,
    pub carts: CartService<S>,
    pub queue: Arc<dyn DelayQueue>,
    pub invalidator: CacheInvalidator,
}

/// The user a request acts for.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(CALLER_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {CALLER_HEADER} header")))?
            .to_str()
            .map_err(|_| ApiError::Unauthenticated(format!("unreadable {CALLER_HEADER} header")))?;
        let id = UserId::from_str(raw.trim())
            .map_err(|e| ApiError::Unauthenticated(format!("invalid {CALLER_HEADER}: {e}")))?;
        Ok(Caller(id))
    }
}

/// Parses a path segment into an id type.
pub(crate) fn parse_id<T>(raw: &str, what: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what} ID: {e}")))
}
