//! Query plan builder: requested-field tree + registry -> statements.

mod computed;
mod errors;
mod plan;
mod plan_builder;
mod requested;


pub use computed::ExistsByUser;
pub use errors::PlanError;
pub use plan::{
    key_label, partition_label, CompiledQuery, FieldKind, FieldPlan, ManyRelationPlan, NodePlan,
    PlannerSettings,
};
pub use plan_builder::QueryPlanner;
pub use requested::{scalars, OrderBy, RequestedField, RequestedNode};
