//! Compiled plans: the statement to run plus the shape its rows map back to.

use std::sync::Arc;

use crate::sql_builder::{SqlDialect, Statement};
use crate::transform::Transform;
use crate::type_catalog::PaginationConfig;

use super::requested::RequestedField;

pub(crate) const KEY_LABEL_PREFIX: &str = "__key_";
pub(crate) const PARTITION_LABEL_PREFIX: &str = "__pk";
pub(crate) const ROW_NUMBER_LABEL: &str = "__rn";

/// Label of a hidden column carrying a parent-side correlation key.
pub fn key_label(column: &str) -> String {
    format!("{}{}", KEY_LABEL_PREFIX, column)
}

pub fn partition_label(index: usize) -> String {
    format!("{}{}", PARTITION_LABEL_PREFIX, index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerSettings {
    pub dialect: SqlDialect,
    pub max_depth: usize,
    /// Per-parent row ceiling for many-relations without pagination or an
    /// explicit limit.
    pub max_relation_rows: u64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            dialect: SqlDialect::SQLite,
            max_depth: 8,
            max_relation_rows: 100,
        }
    }
}

/// Shape of one object level. Row keys are the requested field names;
/// anything else in a row (required columns, correlation keys) is hidden
/// from the output.
#[derive(Debug, Clone)]
pub struct NodePlan {
    pub type_name: String,
    /// Output fields in request order.
    pub fields: Vec<FieldPlan>,
    pub many: Vec<ManyRelationPlan>,
}

impl NodePlan {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
            many: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldPlan {
    pub name: String,
    pub kind: FieldKind,
    pub json: bool,
    pub transform: Option<Transform>,
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Value,
    /// Inline JSON object produced by a correlated sub-select.
    Single(Arc<NodePlan>),
    /// Index into [`NodePlan::many`]; filled by a follow-up statement.
    Many(usize),
}

/// A many-relation to resolve once the parent rows are known.
#[derive(Debug, Clone)]
pub struct ManyRelationPlan {
    /// Requested field name on the parent.
    pub field: String,
    pub parent_type: String,
    pub target: String,
    pub selection: Vec<RequestedField>,
    /// Hidden parent-row labels holding the correlation key.
    pub parent_key_labels: Vec<String>,
    /// Depth of the child objects.
    pub depth: usize,
    pub pagination: Option<PaginationConfig>,
}

#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub statement: Statement,
    pub plan: Arc<NodePlan>,
    /// Row labels identifying the parent a follow-up row belongs to.
    pub partition_labels: Vec<String>,
    /// Rows fetched at most per parent; `None` for root statements.
    pub page_size: Option<usize>,
}
