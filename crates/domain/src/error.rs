//! Errors raised while decoding persisted domain values.

use thiserror::Error;

/// A stored value could not be turned back into a domain type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// A status column held a name no enum variant matches.
    #[error("Unknown {kind} status: {value}")]
    UnknownStatus { kind: &'static str, value: String },

    /// An order number did not have the expected shape.
    #[error("Invalid order number: {0}")]
    InvalidOrderNumber(String),

    /// A negative amount or quantity was read where only non-negative values are valid.
    #[error("Negative {field}: {value}")]
    Negative { field: &'static str, value: i64 },
}
