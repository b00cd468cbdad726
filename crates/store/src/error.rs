use domain::DomainError;
use thiserror::Error;

/// Errors that can occur when interacting with the relational store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be decoded into a domain type.
    #[error("Decode error: {0}")]
    Decode(#[from] DomainError),

    /// A numeric column held a value outside the domain range.
    #[error("Column {column} out of range: {value}")]
    OutOfRange { column: &'static str, value: i64 },

    /// The database aborted the transaction to break a deadlock or a
    /// serialization failure. The transaction is unusable afterwards.
    #[error("Lock conflict: {0}")]
    LockConflict(String),

    /// The store refused the operation (used by the in-memory store's fault injection).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Returns true if the transaction lost a lock race and may be retried
    /// from the start.
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, StoreError::LockConflict(_))
    }
}

/// SQLSTATE `40P01` (deadlock detected) and `40001` (serialization failure).
pub(crate) fn lock_conflict_or_database(err: sqlx::Error) -> StoreError {
    let code = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned());
    match code.as_deref() {
        Some("40P01") | Some("40001") => StoreError::LockConflict(err.to_string()),
        _ => StoreError::Database(err),
    }
}

pub(crate) fn to_u32(column: &'static str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::OutOfRange { column, value })
}
