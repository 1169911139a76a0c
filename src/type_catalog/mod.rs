//! Type mapping registry: how abstract object types resolve onto storage.

pub mod config;
pub mod errors;
mod pagination;
mod registry;
mod type_mapping;

pub use config::TypeCatalogConfig;
pub use errors::ConfigurationError;
pub use pagination::{decode_time_cursor, time_cursor, PaginationConfig};
pub use registry::{
    global_registry, init_global_registry, ExposedKind, RegistryBuilder, ResolvedField,
    TypeRegistry,
};
pub use type_mapping::{
    AliasMapping, ComputedFn, FieldMapping, FieldSource, FilterFn, JoinStrategy, RelationFn,
    RelationMapping, TypeMapping,
};
