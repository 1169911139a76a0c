//! Requested-field tree.
//!
//! Produced by the API layer for each inbound request and consumed by the
//! planner. It deserializes from JSON so the CLI can take it from a file:
//!
//! ```json
//! {
//!   "type": "Post",
//!   "filter": { "id": "p1" },
//!   "fields": ["id", "title", { "name": "author", "fields": ["name"] }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::sql_builder::SortOrder;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedNode {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub fields: Vec<RequestedField>,
    /// Equality predicates on stored columns of the root type.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub filter: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawField")]
pub struct RequestedField {
    pub name: String,
    /// Sub-selection; present exactly for relation fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<RequestedField>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawField {
    Name(String),
    Nested {
        name: String,
        #[serde(default)]
        fields: Option<Vec<RequestedField>>,
    },
}

impl From<RawField> for RequestedField {
    fn from(raw: RawField) -> Self {
        match raw {
            RawField::Name(name) => RequestedField { name, fields: None },
            RawField::Nested { name, fields } => RequestedField { name, fields },
        }
    }
}

impl RequestedField {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: None,
        }
    }

    pub fn nested(name: impl Into<String>, fields: Vec<RequestedField>) -> Self {
        Self {
            name: name.into(),
            fields: Some(fields),
        }
    }

    fn depth(&self) -> usize {
        match &self.fields {
            None => 0,
            Some(fields) => 1 + fields.iter().map(RequestedField::depth).max().unwrap_or(0),
        }
    }
}

impl RequestedNode {
    pub fn new(type_name: impl Into<String>, fields: Vec<RequestedField>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
            filter: Map::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn with_filter(mut self, column: impl Into<String>, value: Value) -> Self {
        self.filter.insert(column.into(), value);
        self
    }

    pub fn with_order(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some(OrderBy {
            column: column.into(),
            order,
        });
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Number of object levels, the root counting as one.
    pub fn depth(&self) -> usize {
        1 + self.fields.iter().map(RequestedField::depth).max().unwrap_or(0)
    }
}

/// Shorthand for scalar field lists in tests and callers.
pub fn scalars(names: &[&str]) -> Vec<RequestedField> {
    names.iter().map(|name| RequestedField::scalar(*name)).collect()
}
