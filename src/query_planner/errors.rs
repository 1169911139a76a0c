use thiserror::Error;

use crate::sql_builder::SqlBuildError;
use crate::type_catalog::ConfigurationError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    SqlBuild(#[from] SqlBuildError),

    #[error("Relation `{type_name}.{field}` was requested without a sub-selection")]
    MissingSelection { type_name: String, field: String },

    #[error("Field `{type_name}.{field}` is not a relation but has a sub-selection")]
    UnexpectedSelection { type_name: String, field: String },

    #[error("Request depth {depth} exceeds the configured maximum of {max}")]
    DepthExceeded { depth: usize, max: usize },
}
