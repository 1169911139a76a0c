//! Query plan builder
//!
//! Walks a requested-field tree against the registry and produces:
//!
//! - one root statement in which every requested scalar, computed field and
//!   single-valued relation is resolved inline (single relations become
//!   correlated sub-selects returning one JSON object each, nested as deep
//!   as the request goes), and
//! - one [`ManyRelationPlan`] per requested many-relation, compiled later
//!   into a bounded follow-up statement once the parent keys are known.
//!
//! A follow-up statement serves every parent at its depth. Each parent's
//! page is bounded with `ROW_NUMBER() OVER (PARTITION BY <parent key>)`, so
//! a one-to-many edge never turns into an unbounded join.
//!
//! All building is synchronous and confined to one [`StatementScope`], which
//! is consumed into an owned [`Statement`] before anything is executed.

use std::sync::Arc;

use log::debug;
use serde_json::{json, Value};

use crate::context::Context;
use crate::sql_builder::{qualified, quote_ident, to_snake_case, QueryBuilder, StatementScope};
use crate::type_catalog::{
    ConfigurationError, FieldSource, FilterFn, JoinStrategy, PaginationConfig, RelationMapping,
    TypeRegistry,
};

use super::errors::PlanError;
use super::plan::{
    key_label, partition_label, CompiledQuery, FieldKind, FieldPlan, ManyRelationPlan, NodePlan,
    PlannerSettings, ROW_NUMBER_LABEL,
};
use super::requested::{RequestedField, RequestedNode};

/// Select list of one object level: `(label, expression)` in order, first
/// label wins.
#[derive(Debug, Default)]
struct SelectList {
    items: Vec<(String, String)>,
}

impl SelectList {
    fn push(&mut self, label: impl Into<String>, expression: impl Into<String>) {
        let label = label.into();
        if !self.contains(&label) {
            self.items.push((label, expression.into()));
        }
    }

    fn contains(&self, label: &str) -> bool {
        self.items.iter().any(|(existing, _)| existing == label)
    }
}

struct NodeRequest<'q> {
    type_name: &'q str,
    fields: &'q [RequestedField],
    alias: String,
    depth: usize,
    /// The node is rendered inside an enclosing JSON object.
    nested_json: bool,
    /// Columns fetched for this node on top of its `required_columns`.
    extra_required: Vec<String>,
}

pub struct QueryPlanner<'r> {
    registry: &'r TypeRegistry,
    settings: PlannerSettings,
}

impl<'r> QueryPlanner<'r> {
    pub fn new(registry: &'r TypeRegistry, settings: PlannerSettings) -> Self {
        Self { registry, settings }
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// Compile the root statement of a request. `filter` is a caller-supplied
    /// predicate conjoined after the type's own additional filter.
    pub fn compile_root(
        &self,
        ctx: &Context,
        request: &RequestedNode,
        filter: Option<&FilterFn>,
    ) -> Result<CompiledQuery, PlanError> {
        let depth = request.depth();
        if depth > self.settings.max_depth {
            return Err(PlanError::DepthExceeded {
                depth,
                max: self.settings.max_depth,
            });
        }

        let type_name = request.type_name.as_str();
        let mapping = self.registry.lookup(type_name)?;
        let scope = StatementScope::new(self.settings.dialect);

        let (sql, plan) = {
            let qb = QueryBuilder::new(&scope).from_fresh(mapping.table_name(type_name), type_name);
            let alias = qb.alias().map(str::to_string).unwrap_or_default();
            let node = NodeRequest {
                type_name,
                fields: &request.fields,
                alias: alias.clone(),
                depth: 1,
                nested_json: false,
                extra_required: Vec::new(),
            };
            let (mut qb, select, plan) = self.build_node(ctx, node, qb, filter)?;

            for (column, value) in &request.filter {
                let param = format!("filter_{}", to_snake_case(column));
                qb = qb.and_where_with(
                    &format!("{} = :{}", qualified(&alias, column), param),
                    [(param.as_str(), value.clone())],
                );
            }
            if let Some(order) = &request.order_by {
                qb = qb.order_by_dir(qualified(&alias, &order.column), order.order);
            }
            if let Some(limit) = request.limit {
                qb = qb.limit(limit);
            }
            for (label, expression) in select.items {
                qb = qb.add_select_as(expression, label);
            }
            (qb.render()?, plan)
        };

        let statement = scope.into_statement(sql);
        statement.verify_bound()?;
        debug!(
            "Compiled root statement for {} ({} params): {}",
            type_name,
            statement.params.len(),
            statement.sql
        );

        Ok(CompiledQuery {
            statement,
            plan: Arc::new(plan),
            partition_labels: Vec::new(),
            page_size: None,
        })
    }

    /// Compile the follow-up statement of a many-relation for the given
    /// parent keys (one value per key column, in key order).
    pub fn compile_many_relation(
        &self,
        ctx: &Context,
        relation: &ManyRelationPlan,
        parent_keys: &[Vec<Value>],
    ) -> Result<CompiledQuery, PlanError> {
        if relation.depth > self.settings.max_depth {
            return Err(PlanError::DepthExceeded {
                depth: relation.depth,
                max: self.settings.max_depth,
            });
        }

        let parent_type = relation.parent_type.as_str();
        let parent_mapping = self.registry.lookup(parent_type)?;
        let resolved = self.registry.resolve_field(parent_type, &relation.field)?;
        let mapping = resolved.relation().ok_or_else(|| ConfigurationError::UnknownField {
            type_name: parent_type.to_string(),
            field: relation.field.clone(),
        })?;
        let target = relation.target.as_str();
        let child_mapping = self.registry.lookup(target)?;
        let child_table = child_mapping.table_name(target);

        let scope = StatementScope::new(self.settings.dialect);

        let sql_and_plan = {
            let base = QueryBuilder::new(&scope);
            let (qb, child_alias, partition) = match &mapping.join {
                JoinStrategy::Columns { child_column, .. } => {
                    let child_alias = scope.alias_for(target);
                    let keys: Vec<Value> = parent_keys.iter().filter_map(|k| k.first().cloned()).collect();
                    let qb = base.from(child_table, &child_alias).where_with(
                        &format!("{} IN (:...parentKeys)", qualified(&child_alias, child_column)),
                        [("parentKeys", Value::Array(keys))],
                    );
                    let partition = vec![qualified(&child_alias, child_column)];
                    (qb, child_alias, partition)
                }
                JoinStrategy::Custom(custom) => {
                    let parent_alias = scope.alias_for(parent_type);
                    let child_alias = scope.alias_for(target);
                    let key_columns = &parent_mapping.key_columns;
                    let qb = base
                        .from(parent_mapping.table_name(parent_type), &parent_alias)
                        .cross_join(child_table, &child_alias);
                    let qb = restrict_parents(qb, &parent_alias, key_columns, parent_keys);
                    let qb = custom(ctx, &parent_alias, &child_alias, qb);
                    let partition = key_columns
                        .iter()
                        .map(|column| qualified(&parent_alias, column))
                        .collect::<Vec<_>>();
                    (qb, child_alias, partition)
                }
            };

            let mut extra_required: Vec<String> = mapping.sort.iter().cloned().collect();
            if let Some(pagination) = &relation.pagination {
                extra_required.extend(pagination.cursor_columns().iter().cloned());
            }

            let node = NodeRequest {
                type_name: target,
                fields: &relation.selection,
                alias: child_alias.clone(),
                depth: relation.depth,
                nested_json: false,
                extra_required,
            };
            let (mut qb, select, plan) = self.build_node(ctx, node, qb, None)?;

            let (custom_order, custom_limit) = qb.take_ordering();
            let mut order_terms = Vec::new();
            if let Some(sort) = &mapping.sort {
                order_terms.push(format!("{} {}", qualified(&child_alias, sort), mapping.order.to_sql()));
            }
            order_terms.extend(custom_order);

            let window = if order_terms.is_empty() {
                format!("ROW_NUMBER() OVER (PARTITION BY {})", partition.join(", "))
            } else {
                format!(
                    "ROW_NUMBER() OVER (PARTITION BY {} ORDER BY {})",
                    partition.join(", "),
                    order_terms.join(", ")
                )
            };

            for (label, expression) in select.items {
                qb = qb.add_select_as(expression, label);
            }
            let mut partition_labels = Vec::with_capacity(partition.len());
            for (i, expression) in partition.into_iter().enumerate() {
                let label = partition_label(i);
                qb = qb.add_select_as(expression, label.clone());
                partition_labels.push(label);
            }
            qb = qb.add_select_as(window, ROW_NUMBER_LABEL);

            let inner = qb.render()?;
            let cap = page_cap(
                relation.pagination.as_ref(),
                custom_limit,
                self.settings.max_relation_rows,
            );
            let page_alias = scope.alias_for("page");
            let limit_param = scope.bind("pageLimit", json!(cap));
            let mut outer_order: Vec<String> = partition_labels
                .iter()
                .map(|label| format!("{}.{}", page_alias, quote_ident(label)))
                .collect();
            outer_order.push(format!("{}.{}", page_alias, quote_ident(ROW_NUMBER_LABEL)));

            let sql = format!(
                "SELECT * FROM ({}) AS {} WHERE {}.{} <= :{} ORDER BY {}",
                inner,
                page_alias,
                page_alias,
                quote_ident(ROW_NUMBER_LABEL),
                limit_param,
                outer_order.join(", ")
            );
            (sql, plan, partition_labels, cap)
        };
        let (sql, plan, partition_labels, cap) = sql_and_plan;

        let statement = scope.into_statement(sql);
        statement.verify_bound()?;
        debug!(
            "Compiled follow-up statement for {}.{} over {} parents: {}",
            parent_type,
            relation.field,
            parent_keys.len(),
            statement.sql
        );

        Ok(CompiledQuery {
            statement,
            plan: Arc::new(plan),
            partition_labels,
            page_size: Some(cap as usize),
        })
    }

    fn build_node<'s>(
        &self,
        ctx: &Context,
        node: NodeRequest<'_>,
        qb: QueryBuilder<'s>,
        caller_filter: Option<&FilterFn>,
    ) -> Result<(QueryBuilder<'s>, SelectList, NodePlan), PlanError> {
        if node.depth > self.settings.max_depth {
            return Err(PlanError::DepthExceeded {
                depth: node.depth,
                max: self.settings.max_depth,
            });
        }

        let type_name = node.type_name;
        let alias = node.alias.as_str();
        let mapping = self.registry.lookup(type_name)?;

        let mut qb = qb;
        if let Some(filter) = &mapping.additional_filter {
            qb = filter(ctx, alias, qb);
        }
        if let Some(filter) = caller_filter {
            qb = filter(ctx, alias, qb);
        }
        let mut extras = qb.take_labelled_selects();

        let mut select = SelectList::default();
        let mut plan = NodePlan::new(type_name);

        for requested in node.fields {
            let name = requested.name.as_str();
            let resolved = self.registry.resolve_field(type_name, name)?;
            let transform = resolved.transform();
            let json = resolved.json();

            if let (Some(relation), Some(target)) = (resolved.relation(), resolved.relation_target()) {
                let selection = requested.fields.as_deref().ok_or_else(|| PlanError::MissingSelection {
                    type_name: type_name.to_string(),
                    field: name.to_string(),
                })?;

                let kind = if relation.many {
                    let key_columns = match &relation.join {
                        JoinStrategy::Columns { parent_column, .. } => vec![parent_column.clone()],
                        JoinStrategy::Custom(_) => mapping.key_columns.clone(),
                    };
                    let parent_key_labels = key_columns
                        .iter()
                        .map(|column| {
                            let label = key_label(column);
                            select.push(label.clone(), qualified(alias, column));
                            label
                        })
                        .collect();
                    plan.many.push(ManyRelationPlan {
                        field: name.to_string(),
                        parent_type: type_name.to_string(),
                        target: target.to_string(),
                        selection: selection.to_vec(),
                        parent_key_labels,
                        depth: node.depth + 1,
                        pagination: resolved.mapping.and_then(|m| m.pagination.clone()),
                    });
                    FieldKind::Many(plan.many.len() - 1)
                } else {
                    let (expression, child) = self.single_relation(
                        ctx,
                        &qb,
                        alias,
                        relation,
                        target,
                        selection,
                        node.depth + 1,
                        node.nested_json,
                    )?;
                    select.push(name, expression);
                    FieldKind::Single(Arc::new(child))
                };

                plan.fields.push(FieldPlan {
                    name: name.to_string(),
                    kind,
                    json: false,
                    transform,
                });
                continue;
            }

            if requested.fields.is_some() {
                return Err(PlanError::UnexpectedSelection {
                    type_name: type_name.to_string(),
                    field: name.to_string(),
                });
            }

            // A labelled select added by a filter satisfies a field of the same name.
            let from_filter = extras.iter().position(|(label, _)| label == name);
            let source = resolved.mapping.map(|m| (&m.source, m.raw_select));
            let expression = match (source, from_filter) {
                (Some((FieldSource::Computed(computed), _)), _) => computed(ctx, alias, qb.subquery()),
                (Some((FieldSource::Column(Some(raw)), true)), _) => raw.replace("{alias}", alias),
                (_, Some(index)) => extras.remove(index).1,
                (Some((FieldSource::Column(Some(column)), false)), None) => qualified(alias, column),
                (Some((FieldSource::Column(None), _)), None) | (None, None) => {
                    qualified(alias, resolved.field)
                }
                (Some((FieldSource::Relation(_) | FieldSource::Alias(_), _)), None) => {
                    return Err(ConfigurationError::InvalidAlias {
                        type_name: type_name.to_string(),
                        field: name.to_string(),
                        reason: "alias does not resolve to a value".to_string(),
                    }
                    .into())
                }
            };

            select.push(name, expression);
            plan.fields.push(FieldPlan {
                name: name.to_string(),
                kind: FieldKind::Value,
                json,
                transform,
            });
        }

        for column in mapping.required_columns.iter().chain(node.extra_required.iter()) {
            select.push(column.clone(), qualified(alias, column));
        }
        for (label, expression) in extras {
            select.push(label, expression);
        }

        Ok((qb, select, plan))
    }

    /// Inline correlated sub-select returning the related object as JSON,
    /// or NULL when there is no match.
    #[allow(clippy::too_many_arguments)]
    fn single_relation<'s>(
        &self,
        ctx: &Context,
        parent_qb: &QueryBuilder<'s>,
        parent_alias: &str,
        relation: &RelationMapping,
        target: &str,
        selection: &[RequestedField],
        depth: usize,
        nested_json: bool,
    ) -> Result<(String, NodePlan), PlanError> {
        let child_mapping = self.registry.lookup(target)?;
        let child_alias = parent_qb.fresh_alias(target);
        let mut child_qb = parent_qb
            .subquery()
            .from(child_mapping.table_name(target), &child_alias);

        child_qb = match &relation.join {
            JoinStrategy::Columns {
                parent_column,
                child_column,
            } => child_qb.where_(format!(
                "{} = {}",
                qualified(&child_alias, child_column),
                qualified(parent_alias, parent_column)
            )),
            JoinStrategy::Custom(custom) => custom(ctx, parent_alias, &child_alias, child_qb),
        };
        if let Some(sort) = &relation.sort {
            child_qb = child_qb.order_by_dir(qualified(&child_alias, sort), relation.order);
        }

        let node = NodeRequest {
            type_name: target,
            fields: selection,
            alias: child_alias,
            depth,
            nested_json: true,
            extra_required: Vec::new(),
        };
        let (child_qb, select, plan) = self.build_node(ctx, node, child_qb, None)?;

        let object = self.settings.dialect.json_object(&select.items);
        let sub_select = child_qb.select(object).limit(1).get_query();
        let expression = if nested_json {
            self.settings.dialect.embed_json(&sub_select)
        } else {
            sub_select
        };
        Ok((expression, plan))
    }
}

/// Per-parent page size: the tighter of the pagination limit and a limit set
/// by a custom relation, else the configured ceiling.
fn page_cap(pagination: Option<&PaginationConfig>, custom_limit: Option<u64>, ceiling: u64) -> u64 {
    match (pagination.map(|p| p.limit as u64), custom_limit) {
        (Some(page), Some(custom)) => page.min(custom),
        (Some(page), None) => page,
        (None, Some(custom)) => custom,
        (None, None) => ceiling,
    }
}

fn restrict_parents<'s>(
    qb: QueryBuilder<'s>,
    parent_alias: &str,
    key_columns: &[String],
    parent_keys: &[Vec<Value>],
) -> QueryBuilder<'s> {
    if let [column] = key_columns {
        let keys: Vec<Value> = parent_keys.iter().filter_map(|k| k.first().cloned()).collect();
        return qb.where_with(
            &format!("{} IN (:...parentKeys)", qualified(parent_alias, column)),
            [("parentKeys", Value::Array(keys))],
        );
    }

    let scope = qb.scope();
    let alternatives: Vec<String> = parent_keys
        .iter()
        .enumerate()
        .map(|(i, key)| {
            key_columns
                .iter()
                .zip(key)
                .enumerate()
                .map(|(j, (column, value))| {
                    let param = scope.bind(&format!("parentKey_{}_{}", i, j), value.clone());
                    format!("{} = :{}", qualified(parent_alias, column), param)
                })
                .collect::<Vec<_>>()
                .join(" AND ")
        })
        .collect();

    if alternatives.is_empty() {
        qb.where_("1 = 0")
    } else {
        qb.where_(
            alternatives
                .iter()
                .map(|alternative| format!("({})", alternative))
                .collect::<Vec<_>>()
                .join(" OR "),
        )
    }
}
