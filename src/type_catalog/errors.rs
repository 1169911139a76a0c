//! # Type Catalog Error Types
//!
//! Every error in this module is a schema-author mistake: an unknown type, a
//! field that resolves two ways at once, pagination declared where it cannot
//! apply. They are raised while the registry is being built so that a
//! misconfigured process refuses to start instead of failing per request.
//!
//! The only variants that can also appear at request time are `UnknownType`
//! and `UnknownField`, when the requested-field tree names something the
//! registry has never heard of.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("No type mapping registered for `{type_name}`")]
    UnknownType { type_name: String },

    #[error("Field `{field}` is not exposed on type `{type_name}`")]
    UnknownField { type_name: String, field: String },

    #[error("Type `{type_name}` is registered more than once")]
    DuplicateType { type_name: String },

    #[error("Field `{type_name}.{field}` declares more than one value source: {sources}")]
    ConflictingValueSources {
        type_name: String,
        field: String,
        sources: String,
    },

    #[error("Field `{type_name}.{field}` declares pagination but is not a relation")]
    PaginationOnNonRelation { type_name: String, field: String },

    #[error("Field `{type_name}.{field}` declares pagination on a single-valued relation")]
    PaginationOnSingleRelation { type_name: String, field: String },

    #[error("Alias `{type_name}.{field}` is invalid: {reason}")]
    InvalidAlias {
        type_name: String,
        field: String,
        reason: String,
    },

    #[error("Relation `{type_name}.{field}` points at unregistered type `{target}`")]
    UnknownRelationTarget {
        type_name: String,
        field: String,
        target: String,
    },

    #[error("Field `{type_name}.{field}` is exposed as {exposed} but mapped as {mapped}")]
    RelationKindMismatch {
        type_name: String,
        field: String,
        exposed: String,
        mapped: String,
    },

    #[error("Unknown transform `{name}` on `{type_name}.{field}`")]
    UnknownTransform {
        type_name: String,
        field: String,
        name: String,
    },

    #[error("Invalid type catalog: {message}")]
    InvalidCatalog { message: String },
}

impl ConfigurationError {
    /// Create an InvalidCatalog error with context information
    ///
    /// # Example
    /// ```ignore
    /// ConfigurationError::catalog_error_with_context(
    ///     "catalog.yaml",
    ///     "While parsing type definitions"
    /// )
    /// ```
    pub fn catalog_error_with_context(
        message: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        ConfigurationError::InvalidCatalog {
            message: format!("{}\n  Context: {}", message.into(), context.into()),
        }
    }

    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        ConfigurationError::UnknownType {
            type_name: type_name.into(),
        }
    }
}
