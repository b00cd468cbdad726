//! Public error taxonomy of the fulfillment operations.

use cache::CacheError;
use common::ProductId;
use domain::OrderError;
use store::StoreError;
use thiserror::Error;

use crate::timeout::QueueError;

/// The one error type every public operation returns.
///
/// Infrastructure faults from the store, cache and delay queue are flattened
/// into [`FulfillmentError::Infrastructure`] so no internal error type leaks
/// past this crate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FulfillmentError {
    /// Malformed or unacceptable input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Missing order, product, address or cart line.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The caller does not own the resource.
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// The operation is not valid for the current status.
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// Not enough units left.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    StockInsufficient {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    /// Every conditional decrement lost its race while stock was still
    /// sufficient. Retrying the whole call may succeed.
    #[error("Stock contention on product {product_id} after {attempts} attempts")]
    StockContention { product_id: ProductId, attempts: u32 },

    /// Store, cache or queue unavailable.
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl FulfillmentError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        FulfillmentError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for failures a caller may retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FulfillmentError::StockContention { .. })
    }
}

impl From<StoreError> for FulfillmentError {
    fn from(err: StoreError) -> Self {
        match err {
            // The whole transaction lost a race; nothing was written.
            StoreError::LockConflict(msg) => FulfillmentError::StateConflict(msg),
            other => FulfillmentError::Infrastructure(other.to_string()),
        }
    }
}

impl From<QueueError> for FulfillmentError {
    fn from(err: QueueError) -> Self {
        FulfillmentError::Infrastructure(err.to_string())
    }
}

impl From<CacheError> for FulfillmentError {
    fn from(err: CacheError) -> Self {
        FulfillmentError::Infrastructure(err.to_string())
    }
}

impl From<OrderError> for FulfillmentError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { .. } => FulfillmentError::StateConflict(err.to_string()),
            OrderError::NotOwner { .. } => FulfillmentError::Authorization(err.to_string()),
            OrderError::NegativeTotal { .. } | OrderError::ConversionOverflow { .. } => {
                FulfillmentError::Validation(err.to_string())
            }
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
