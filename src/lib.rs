//! GraphORM - object-graph query compiler
//!
//! This crate turns a tree of requested fields over abstract types into a
//! small number of parameterized SQL statements and reassembles the flat
//! rows into nested, authorized results:
//! - Type mapping registry (code or YAML catalog)
//! - SQL fragment builder with statement-unique aliases
//! - Query planning (inline single relations, bounded many-relation follow-ups)
//! - Result assembly and per-field transforms

pub mod utils;

pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod query_planner;
pub mod result_assembler;
pub mod sql_builder;
pub mod storage;
pub mod transform;
pub mod type_catalog;

pub use context::Context;
pub use engine::{GraphOrm, QueryTimings};
pub use errors::GraphOrmError;
pub use query_planner::{RequestedField, RequestedNode};
pub use storage::{SqliteStorage, Storage};
pub use transform::Transform;
pub use type_catalog::{FieldMapping, RelationMapping, TypeMapping, TypeRegistry};
