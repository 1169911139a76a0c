//! Crate-level error type.
//!
//! Configuration and plan errors come from the schema or the request shape.
//! Storage failures surface as a single `DataFetch` for the whole request.
//! A failing transform fails the request too: no partially redacted result
//! is ever returned.

use thiserror::Error;

use crate::query_planner::PlanError;
use crate::storage::StorageError;
use crate::transform::TransformError;
use crate::type_catalog::ConfigurationError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphOrmError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Data fetch failed: {0}")]
    DataFetch(#[from] StorageError),

    #[error("Transform of `{type_name}.{field}` failed: {source}")]
    Transform {
        type_name: String,
        field: String,
        #[source]
        source: TransformError,
    },

    #[error("Data integrity error at `{type_name}.{field}`: {message}")]
    DataIntegrity {
        type_name: String,
        field: String,
        message: String,
    },
}

impl GraphOrmError {
    pub fn data_integrity_with_context(
        type_name: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        GraphOrmError::DataIntegrity {
            type_name: type_name.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GraphOrmError::Configuration(_) | GraphOrmError::Plan(PlanError::Configuration(_))
        )
    }
}
