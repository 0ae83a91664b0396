use parlor_schema::{DelegateError, SchemaError};

/// Errors from encoding or decoding a record.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A value does not match the shape its descriptor declares. On decode
    /// the whole record should be treated as corrupt.
    #[error("format error at {type_name}.{field}: {reason}")]
    Format {
        type_name: String,
        field: String,
        reason: String,
    },

    /// An element descriptor could not be resolved.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The record's delegated-field capability failed.
    #[error("delegated field {type_name}.{field}: {source}")]
    Delegate {
        type_name: String,
        field: String,
        #[source]
        source: DelegateError,
    },

    /// The descriptor passed in belongs to a different type.
    #[error("descriptor for {descriptor} used with record type {record}")]
    TypeMismatch {
        descriptor: &'static str,
        record: &'static str,
    },
}

impl CodecError {
    pub(crate) fn format(
        type_name: &str,
        field: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::Format {
            type_name: type_name.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias for codec results.
pub type CodecResult<T> = Result<T, CodecError>;
