use thiserror::Error;

/// Errors raised while parsing wire-level identifiers into domain enums.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("unknown batch type: {0}")]
    UnknownBatchType(String),
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("operation {operation} is not valid for batch type {batch_type}")]
    UnsupportedOperation {
        batch_type: &'static str,
        operation: &'static str,
    },
}
