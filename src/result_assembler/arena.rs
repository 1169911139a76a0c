//! Node arena
//!
//! Every object of a response lives in one arena slot, addressed by index.
//! A node keeps its raw row plus one slot per relation field. Single
//! relations are filled as soon as the row is inserted (their JSON object
//! arrived with the row). Many relations start `Pending` and are grouped by
//! (plan, relation) so one follow-up statement can fill every parent of a
//! group at once.
//!
//! Finalization walks a node after all of its relations are resolved:
//! children first, then JSON parsing, then the field transforms of the node
//! (run concurrently against a snapshot of the node), then stripping of
//! hidden columns.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::{try_join_all, BoxFuture};
use log::debug;
use serde_json::{Map, Value};

use super::connection::{shape_many, FinalNode};
use crate::context::Context;
use crate::errors::GraphOrmError;
use crate::query_planner::{FieldKind, ManyRelationPlan, NodePlan};
use crate::storage::Row;
use crate::utils::identity_key;

pub type NodeId = usize;

const KEY_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone)]
enum RelationSlot {
    Pending,
    Single(Option<NodeId>),
    /// Children plus the page size they were fetched with.
    Many(Vec<NodeId>, Option<usize>),
}

#[derive(Debug)]
struct Node {
    plan: Arc<NodePlan>,
    row: Map<String, Value>,
    /// `(field index, slot)` for every relation field of `plan`.
    relations: Vec<(usize, RelationSlot)>,
}

/// Parents waiting on the same many-relation of the same plan.
#[derive(Debug, Clone)]
pub struct PendingGroup {
    pub plan: Arc<NodePlan>,
    pub many_index: usize,
    pub parents: Vec<NodeId>,
}

impl PendingGroup {
    pub fn relation(&self) -> &ManyRelationPlan {
        &self.plan.many[self.many_index]
    }
}

#[derive(Debug, Default)]
pub struct ResultArena {
    nodes: Vec<Node>,
    pending: Vec<PendingGroup>,
}

impl ResultArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert one node per row, in row order.
    pub fn add_rows(&mut self, plan: &Arc<NodePlan>, rows: Vec<Row>) -> Result<Vec<NodeId>, GraphOrmError> {
        rows.into_iter().map(|row| self.insert_node(plan, row)).collect()
    }

    /// Groups whose many-relations still need a follow-up statement.
    pub fn take_pending(&mut self) -> Vec<PendingGroup> {
        std::mem::take(&mut self.pending)
    }

    /// Distinct, non-null correlation keys of a group's parents, in first-seen order.
    pub fn parent_keys(&self, group: &PendingGroup) -> Vec<Vec<Value>> {
        let labels = &group.relation().parent_key_labels;
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for parent in &group.parents {
            let Some(node) = self.nodes.get(*parent) else { continue };
            let Some(values) = key_values(&node.row, labels) else { continue };
            if let Some(key) = composite_key(&values) {
                if seen.insert(key) {
                    keys.push(values);
                }
            }
        }
        keys
    }

    /// Attach the rows of a group's follow-up statement to its parents.
    /// Rows must arrive ordered within each partition.
    pub fn attach_many(
        &mut self,
        group: &PendingGroup,
        child_plan: &Arc<NodePlan>,
        partition_labels: &[String],
        page_size: Option<usize>,
        rows: Vec<Row>,
    ) -> Result<(), GraphOrmError> {
        let relation = group.relation();
        let mut by_parent: HashMap<String, Vec<NodeId>> = HashMap::new();

        for row in rows {
            let key = key_values(&row, partition_labels)
                .as_deref()
                .and_then(composite_key)
                .ok_or_else(|| {
                    GraphOrmError::data_integrity_with_context(
                        &relation.parent_type,
                        &relation.field,
                        "follow-up row carries no parent key",
                    )
                })?;
            let child = self.insert_node(child_plan, row)?;
            by_parent.entry(key).or_default().push(child);
        }

        debug!(
            "Attaching {}.{}: {} parents, {} with children",
            relation.parent_type,
            relation.field,
            group.parents.len(),
            by_parent.len()
        );

        let field_index = group
            .plan
            .fields
            .iter()
            .position(|f| matches!(f.kind, FieldKind::Many(i) if i == group.many_index))
            .ok_or_else(|| {
                GraphOrmError::data_integrity_with_context(
                    &relation.parent_type,
                    &relation.field,
                    "relation missing from plan",
                )
            })?;

        for parent in &group.parents {
            let children = self
                .nodes
                .get(*parent)
                .and_then(|node| key_values(&node.row, &relation.parent_key_labels))
                .as_deref()
                .and_then(composite_key)
                .and_then(|key| by_parent.get(&key).cloned())
                .unwrap_or_default();
            self.set_slot(*parent, field_index, RelationSlot::Many(children, page_size));
        }
        Ok(())
    }

    /// Resolve every parent of a group to an empty list (no parent had a key).
    pub fn attach_empty(&mut self, group: &PendingGroup) {
        for (index, field) in group.plan.fields.iter().enumerate() {
            if matches!(field.kind, FieldKind::Many(i) if i == group.many_index) {
                for parent in &group.parents {
                    self.set_slot(*parent, index, RelationSlot::Many(Vec::new(), None));
                }
            }
        }
    }

    fn set_slot(&mut self, node: NodeId, field_index: usize, value: RelationSlot) {
        if let Some(node) = self.nodes.get_mut(node) {
            if let Some((_, slot)) = node.relations.iter_mut().find(|(i, _)| *i == field_index) {
                *slot = value;
            }
        }
    }

    fn insert_node(&mut self, plan: &Arc<NodePlan>, mut row: Row) -> Result<NodeId, GraphOrmError> {
        let mut relations = Vec::new();
        for (index, field) in plan.fields.iter().enumerate() {
            match &field.kind {
                FieldKind::Value => {}
                FieldKind::Single(child_plan) => {
                    let raw = row.remove(&field.name).unwrap_or(Value::Null);
                    let slot = match parse_object(raw, &plan.type_name, &field.name)? {
                        Some(object) => RelationSlot::Single(Some(self.insert_node(child_plan, object)?)),
                        None => RelationSlot::Single(None),
                    };
                    relations.push((index, slot));
                }
                FieldKind::Many(_) => relations.push((index, RelationSlot::Pending)),
            }
        }

        let id = self.nodes.len();
        self.nodes.push(Node {
            plan: plan.clone(),
            row,
            relations,
        });

        for field in &plan.fields {
            if let FieldKind::Many(many_index) = field.kind {
                self.enqueue(plan, many_index, id);
            }
        }
        Ok(id)
    }

    fn enqueue(&mut self, plan: &Arc<NodePlan>, many_index: usize, node: NodeId) {
        match self
            .pending
            .iter_mut()
            .find(|g| g.many_index == many_index && Arc::ptr_eq(&g.plan, plan))
        {
            Some(group) => group.parents.push(node),
            None => self.pending.push(PendingGroup {
                plan: plan.clone(),
                many_index,
                parents: vec![node],
            }),
        }
    }

    /// Build the caller-visible object of a node and everything below it.
    pub fn finalize<'a>(
        &'a self,
        ctx: &'a Context,
        id: NodeId,
    ) -> BoxFuture<'a, Result<FinalNode, GraphOrmError>> {
        Box::pin(async move {
            let node = self.nodes.get(id).ok_or_else(|| {
                GraphOrmError::data_integrity_with_context("?", "?", format!("unknown node {}", id))
            })?;
            let plan = &node.plan;
            let mut full = node.row.clone();

            for (index, slot) in &node.relations {
                let field = &plan.fields[*index];
                let value = match slot {
                    RelationSlot::Pending => {
                        return Err(GraphOrmError::data_integrity_with_context(
                            &plan.type_name,
                            &field.name,
                            "relation was never resolved",
                        ))
                    }
                    RelationSlot::Single(None) => Value::Null,
                    RelationSlot::Single(Some(child)) => Value::Object(self.finalize(ctx, *child).await?.output),
                    RelationSlot::Many(children, page_size) => {
                        let finals = try_join_all(children.iter().map(|c| self.finalize(ctx, *c))).await?;
                        let pagination = match field.kind {
                            FieldKind::Many(i) => plan.many.get(i).and_then(|m| m.pagination.as_ref()),
                            _ => None,
                        };
                        let pagination = match (pagination, page_size) {
                            (Some(p), Some(size)) => Some(p.capped(*size)),
                            (p, _) => p.cloned(),
                        };
                        shape_many(finals, pagination.as_ref())
                    }
                };
                full.insert(field.name.clone(), value);
            }

            for field in plan.fields.iter().filter(|f| f.json) {
                if let Some(Value::String(text)) = full.get(&field.name) {
                    let parsed = serde_json::from_str::<Value>(text).map_err(|e| {
                        GraphOrmError::data_integrity_with_context(
                            &plan.type_name,
                            &field.name,
                            format!("stored JSON does not parse: {}", e),
                        )
                    })?;
                    full.insert(field.name.clone(), parsed);
                }
            }

            let snapshot = full.clone();
            let snapshot = &snapshot;
            let transformed = try_join_all(plan.fields.iter().filter_map(move |field| {
                let transform = field.transform.as_ref()?;
                Some(async move {
                    let value = snapshot.get(&field.name).cloned().unwrap_or(Value::Null);
                    transform
                        .apply(value, ctx, snapshot)
                        .await
                        .map(|value| (field.name.clone(), value))
                        .map_err(|source| GraphOrmError::Transform {
                            type_name: plan.type_name.clone(),
                            field: field.name.clone(),
                            source,
                        })
                })
            }))
            .await?;
            for (name, value) in transformed {
                full.insert(name, value);
            }

            let output = plan
                .fields
                .iter()
                .map(|field| {
                    (
                        field.name.clone(),
                        full.get(&field.name).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect();

            Ok(FinalNode {
                raw: node.row.clone(),
                full,
                output,
            })
        })
    }
}

fn key_values(row: &Map<String, Value>, labels: &[String]) -> Option<Vec<Value>> {
    labels
        .iter()
        .map(|label| row.get(label).filter(|v| !v.is_null()).cloned())
        .collect()
}

fn composite_key(values: &[Value]) -> Option<String> {
    let parts: Option<Vec<String>> = values.iter().map(identity_key).collect();
    parts.map(|parts| parts.join(&KEY_SEPARATOR.to_string()))
}

/// A single relation arrives as a JSON object, as JSON text, or as NULL.
fn parse_object(raw: Value, type_name: &str, field: &str) -> Result<Option<Row>, GraphOrmError> {
    let value = match raw {
        Value::String(text) => serde_json::from_str(&text).map_err(|e| {
            GraphOrmError::data_integrity_with_context(
                type_name,
                field,
                format!("related object is not valid JSON: {}", e),
            )
        })?,
        other => other,
    };
    match value {
        Value::Null => Ok(None),
        Value::Object(object) => Ok(Some(object)),
        other => Err(GraphOrmError::data_integrity_with_context(
            type_name,
            field,
            format!("expected a related object, got {}", other),
        )),
    }
}
