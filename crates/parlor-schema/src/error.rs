/// Errors raised while building a type descriptor.
///
/// A schema error is fatal to the type that produced it, not to the
/// registry: nothing from the failed build is cached.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    /// A field was declared with a kind/flag combination the store cannot handle.
    #[error("unsupported shape for {type_name}.{field}: {reason}")]
    UnsupportedShape {
        type_name: String,
        field: String,
        reason: String,
    },

    /// Two fields share a name or accessor key.
    #[error("duplicate field {field} in {type_name}")]
    DuplicateField { type_name: String, field: String },

    /// Two distinct types claim the same logical (bucket) name.
    #[error("type name {0} is already registered by another type")]
    DuplicateTypeName(String),

    /// A descriptor was read before its construction finished.
    #[error("descriptor for {0} is incomplete")]
    Incomplete(String),
}

/// Convenience alias for schema results.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors returned by [`DelegatedFields`](crate::DelegatedFields)
/// implementations and the hooks that call them.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DelegateError {
    /// The record has no delegated field with this accessor.
    #[error("no delegated field {0}")]
    UnknownField(String),

    /// The record type declares delegated fields but exposes no delegate.
    #[error("type {0} does not expose delegated fields")]
    Unsupported(&'static str),

    /// The stored value cannot be turned back into the in-memory field.
    #[error("invalid value for delegated field {accessor}: {reason}")]
    InvalidValue { accessor: String, reason: String },

    /// The record could not be materialized from, or written back to, its
    /// serde view.
    #[error("record view error: {0}")]
    View(String),
}
