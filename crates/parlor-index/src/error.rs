//! Error types for the index crate.

use parlor_schema::SchemaError;

/// Errors that can occur while maintaining index buckets.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A unique index already maps the key to a different primary key.
    #[error("unique constraint violated in {bucket}: {key:?} belongs to {existing}, not {attempted}")]
    ConstraintViolation {
        bucket: String,
        key: String,
        existing: String,
        attempted: String,
    },

    /// The underlying key-value engine failed.
    #[error("storage error: {0}")]
    Storage(#[from] redb::Error),

    /// A stored primary record could not be parsed while rebuilding.
    #[error("corrupt record {key} in {bucket}: {reason}")]
    Format {
        bucket: String,
        key: String,
        reason: String,
    },

    /// An element descriptor could not be resolved.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

macro_rules! storage_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for IndexError {
                fn from(err: $ty) -> Self {
                    Self::Storage(err.into())
                }
            }
        )*
    };
}

storage_from!(
    redb::StorageError,
    redb::TableError,
    redb::TransactionError,
    redb::CommitError,
);

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
