//! Output shape of many-relations.
//!
//! Paginated relations render as a connection:
//!
//! ```json
//! { "edges": [{ "node": {...}, "cursor": "dGltZToxNzAw..." }],
//!   "pageInfo": { "hasNextPage": false, "hasPreviousPage": false,
//!                 "startCursor": "...", "endCursor": "..." } }
//! ```
//!
//! Unpaginated relations are plain arrays.

use serde_json::{json, Map, Value};

use crate::type_catalog::PaginationConfig;

/// A finalized child. `raw` is the fetched row before parsing and
/// transforms (cursor input), `full` still carries hidden columns, `output`
/// is what the caller sees.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalNode {
    pub raw: Map<String, Value>,
    pub full: Map<String, Value>,
    pub output: Map<String, Value>,
}

pub fn shape_many(children: Vec<FinalNode>, pagination: Option<&PaginationConfig>) -> Value {
    let Some(pagination) = pagination else {
        return Value::Array(
            children
                .into_iter()
                .map(|child| Value::Object(child.output))
                .collect(),
        );
    };

    let fetched = children.len();
    let edges: Vec<(Option<String>, Map<String, Value>)> = children
        .into_iter()
        .map(|child| (pagination.cursor(&child.raw), child.output))
        .collect();

    let start_cursor = edges.first().and_then(|(cursor, _)| cursor.clone());
    let end_cursor = edges.last().and_then(|(cursor, _)| cursor.clone());

    json!({
        "edges": edges
            .into_iter()
            .map(|(cursor, node)| json!({ "node": node, "cursor": cursor }))
            .collect::<Vec<_>>(),
        "pageInfo": {
            "hasNextPage": pagination.has_next_page(fetched),
            "hasPreviousPage": pagination.has_previous_page(),
            "startCursor": start_cursor,
            "endCursor": end_cursor,
        }
    })
}
