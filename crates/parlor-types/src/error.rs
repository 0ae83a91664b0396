use thiserror::Error;

/// Errors produced while moving generic values in and out of their
/// on-disk document form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("non-finite float {0} cannot be stored")]
    NonFinite(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
