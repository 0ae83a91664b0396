use parlor_codec::CodecError;
use parlor_index::IndexError;
use parlor_schema::SchemaError;
use parlor_types::TypeError;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record type could not be described.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Index maintenance failed, including unique constraint violations.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// A generic object could not be written as a document.
    #[error("document error: {0}")]
    Document(#[from] TypeError),

    /// A stored document could not be parsed.
    #[error("corrupt record {key} in {bucket}: {reason}")]
    Corrupt {
        bucket: String,
        key: String,
        reason: String,
    },

    /// The underlying key-value engine failed.
    #[error("storage error: {0}")]
    Storage(#[from] redb::Error),

    /// I/O error while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for [`StoreConfig`].
    ///
    /// [`StoreConfig`]: crate::StoreConfig
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// No registered record type has this name.
    #[error("unknown record type: {0}")]
    UnknownType(String),
}

impl StoreError {
    /// Whether this error is a unique index violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::Index(IndexError::ConstraintViolation { .. }))
    }
}

macro_rules! storage_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(err: $ty) -> Self {
                    Self::Storage(err.into())
                }
            }
        )*
    };
}

storage_from!(
    redb::DatabaseError,
    redb::StorageError,
    redb::TableError,
    redb::TransactionError,
    redb::CommitError,
);

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
