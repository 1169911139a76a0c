use serde_json::Value;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransformError {
    #[error("{0}")]
    Failed(String),

    #[error("Expected {expected}, got {actual}")]
    UnexpectedValue { expected: String, actual: String },

    #[error("Lookup failed: {0}")]
    Storage(#[from] StorageError),
}

impl TransformError {
    pub fn unexpected(expected: impl Into<String>, actual: &Value) -> Self {
        TransformError::UnexpectedValue {
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }
}
