use thiserror::Error;

/// Errors raised by the event store and derived-state store.
///
/// Maps onto the `Storage-io` and `Parse`/`Protocol` error kinds of the
/// core's error taxonomy: every variant here is either a durability failure
/// (fatal to the calling ingest worker) or a rejected/invalid event.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The event failed id or signature verification, or was otherwise malformed.
    #[error("invalid event: {0}")]
    Invalid(String),

    /// Persistence failure: connection pool, SQLite, or I/O error.
    #[error("storage io error: {0}")]
    StorageIo(String),

    /// A stored row could not be decoded back into a domain type.
    #[error("corrupt row: {0}")]
    Decode(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::StorageIo(e.to_string())
    }
}

impl From<deadpool_sqlite::PoolError> for StoreError {
    fn from(e: deadpool_sqlite::PoolError) -> Self {
        StoreError::StorageIo(e.to_string())
    }
}

impl From<deadpool_sqlite::InteractError> for StoreError {
    fn from(e: deadpool_sqlite::InteractError) -> Self {
        StoreError::StorageIo(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
