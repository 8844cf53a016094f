//! Error types for the credential store.

use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while reading or writing stored values.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected a read or write.
    #[error("database error: {0}")]
    Database(String),

    /// The database was opened without a required column family.
    #[error("column family not found: {0}")]
    MissingColumnFamily(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Database(err.to_string())
    }
}
