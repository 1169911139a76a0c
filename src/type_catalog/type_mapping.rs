//! Type and field mappings
//!
//! A [`TypeMapping`] describes how one abstract type resolves onto a storage
//! relation. Each of its fields carries exactly one [`FieldSource`] plus
//! optional decorations (JSON parsing, a post-fetch transform, pagination).
//!
//! Schema callbacks receive the request [`Context`] and the alias the
//! current type is bound to in the statement being built, and operate on a
//! [`QueryBuilder`] that shares that statement's alias counter and
//! parameters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::sql_builder::{QueryBuilder, SortOrder};
use crate::transform::Transform;

use super::pagination::PaginationConfig;

/// Predicate always conjoined into queries of a type: `(ctx, alias, qb) -> qb`.
pub type FilterFn =
    Arc<dyn for<'s> Fn(&Context, &str, QueryBuilder<'s>) -> QueryBuilder<'s> + Send + Sync>;

/// Correlated sub-expression for a computed field: `(ctx, alias, qb) -> sql`.
/// The builder is a fresh sub-query over the enclosing statement's scope.
pub type ComputedFn = Arc<dyn for<'s> Fn(&Context, &str, QueryBuilder<'s>) -> String + Send + Sync>;

/// Custom relation predicate: `(ctx, parent_alias, child_alias, qb) -> qb`.
pub type RelationFn = Arc<
    dyn for<'s> Fn(&Context, &str, &str, QueryBuilder<'s>) -> QueryBuilder<'s> + Send + Sync,
>;

#[derive(Clone, Default)]
pub struct TypeMapping {
    /// Storage relation name; defaults to the type name.
    pub source_table: Option<String>,
    /// Identity columns, used to correlate custom many-relation rows with
    /// their parents.
    pub key_columns: Vec<String>,
    /// Always fetched, whatever the caller asked for.
    pub required_columns: Vec<String>,
    pub additional_filter: Option<FilterFn>,
    pub fields: HashMap<String, FieldMapping>,
}

impl TypeMapping {
    pub fn new() -> Self {
        Self {
            key_columns: vec!["id".to_string()],
            ..Default::default()
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.source_table = Some(table.into());
        self
    }

    pub fn key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn required<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: for<'s> Fn(&Context, &str, QueryBuilder<'s>) -> QueryBuilder<'s> + Send + Sync + 'static,
    {
        self.additional_filter = Some(Arc::new(filter));
        self
    }

    pub fn field(mut self, name: impl Into<String>, mapping: FieldMapping) -> Self {
        self.fields.insert(name.into(), mapping);
        self
    }

    pub fn table_name<'a>(&'a self, type_name: &'a str) -> &'a str {
        self.source_table.as_deref().unwrap_or(type_name)
    }
}

impl fmt::Debug for TypeMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<_> = self.fields.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        f.debug_struct("TypeMapping")
            .field("source_table", &self.source_table)
            .field("key_columns", &self.key_columns)
            .field("required_columns", &self.required_columns)
            .field("additional_filter", &self.additional_filter.is_some())
            .field("fields", &fields)
            .finish()
    }
}

/// Where a field's value comes from. Exactly one per field.
#[derive(Clone)]
pub enum FieldSource {
    /// A stored column, defaulting to the field name. With `raw_select` the
    /// string is a hand-written SQL expression instead.
    Column(Option<String>),
    Computed(ComputedFn),
    Relation(RelationMapping),
    /// Resolve as another field of the same type, optionally viewing a
    /// relation's target through a different registered type.
    Alias(AliasMapping),
}

impl FieldSource {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldSource::Column(_) => "column",
            FieldSource::Computed(_) => "computed",
            FieldSource::Relation(r) if r.many => "many-relation",
            FieldSource::Relation(_) => "single-relation",
            FieldSource::Alias(_) => "alias",
        }
    }
}

impl fmt::Debug for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSource::Column(column) => f.debug_tuple("Column").field(column).finish(),
            FieldSource::Computed(_) => f.write_str("Computed(..)"),
            FieldSource::Relation(relation) => f.debug_tuple("Relation").field(relation).finish(),
            FieldSource::Alias(alias) => f.debug_tuple("Alias").field(alias).finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasMapping {
    pub field: String,
    pub type_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct FieldMapping {
    pub source: FieldSource,
    /// Column stores a JSON document that must be parsed.
    pub json: bool,
    pub transform: Option<Transform>,
    pub pagination: Option<PaginationConfig>,
    pub raw_select: bool,
}

impl FieldMapping {
    fn with_source(source: FieldSource) -> Self {
        Self {
            source,
            json: false,
            transform: None,
            pagination: None,
            raw_select: false,
        }
    }

    /// Plain column named like the field.
    pub fn plain() -> Self {
        Self::with_source(FieldSource::Column(None))
    }

    pub fn column(column: impl Into<String>) -> Self {
        Self::with_source(FieldSource::Column(Some(column.into())))
    }

    /// Hand-written SQL expression. `{alias}` is replaced by the alias of
    /// the type being selected.
    pub fn raw(expression: impl Into<String>) -> Self {
        Self {
            raw_select: true,
            ..Self::column(expression)
        }
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: for<'s> Fn(&Context, &str, QueryBuilder<'s>) -> String + Send + Sync + 'static,
    {
        Self::with_source(FieldSource::Computed(Arc::new(f)))
    }

    pub fn relation(relation: RelationMapping) -> Self {
        Self::with_source(FieldSource::Relation(relation))
    }

    pub fn alias(field: impl Into<String>, type_name: Option<&str>) -> Self {
        Self::with_source(FieldSource::Alias(AliasMapping {
            field: field.into(),
            type_name: type_name.map(str::to_string),
        }))
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = Some(match self.transform.take() {
            Some(existing) => existing.then(transform),
            None => transform,
        });
        self
    }

    pub fn paginate(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn as_relation(&self) -> Option<&RelationMapping> {
        match &self.source {
            FieldSource::Relation(relation) => Some(relation),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub enum JoinStrategy {
    /// `child.child_column = parent.parent_column`
    Columns {
        parent_column: String,
        child_column: String,
    },
    Custom(RelationFn),
}

impl JoinStrategy {
    pub fn columns(parent_column: impl Into<String>, child_column: impl Into<String>) -> Self {
        JoinStrategy::Columns {
            parent_column: parent_column.into(),
            child_column: child_column.into(),
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: for<'s> Fn(&Context, &str, &str, QueryBuilder<'s>) -> QueryBuilder<'s>
            + Send
            + Sync
            + 'static,
    {
        JoinStrategy::Custom(Arc::new(f))
    }
}

impl fmt::Debug for JoinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinStrategy::Columns {
                parent_column,
                child_column,
            } => write!(f, "Columns({} = {})", parent_column, child_column),
            JoinStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RelationMapping {
    /// Registered type of the related objects.
    pub target: String,
    pub many: bool,
    pub join: JoinStrategy,
    pub sort: Option<String>,
    pub order: SortOrder,
}

impl RelationMapping {
    pub fn one(target: impl Into<String>, join: JoinStrategy) -> Self {
        Self {
            target: target.into(),
            many: false,
            join,
            sort: None,
            order: SortOrder::Asc,
        }
    }

    pub fn many(target: impl Into<String>, join: JoinStrategy) -> Self {
        Self {
            many: true,
            ..Self::one(target, join)
        }
    }

    pub fn sort(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(column.into());
        self.order = order;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{negate, to_bool};

    #[test]
    fn test_type_mapping_defaults() {
        let mapping = TypeMapping::new();
        assert_eq!(mapping.key_columns, vec!["id"]);
        assert_eq!(mapping.table_name("Post"), "Post");
        assert_eq!(mapping.clone().table("post").table_name("Post"), "post");
    }

    #[test]
    fn test_transforms_compose_in_declaration_order() {
        let field = FieldMapping::column("private")
            .transform(to_bool())
            .transform(negate());
        assert!(matches!(field.transform, Some(Transform::Chain(_, _))));
    }

    #[test]
    fn test_field_source_kinds() {
        let many = FieldMapping::relation(RelationMapping::many(
            "Comment",
            JoinStrategy::columns("id", "parentId"),
        ));
        assert_eq!(many.source.kind(), "many-relation");
        assert_eq!(FieldMapping::raw("1").source.kind(), "column");
        assert!(FieldMapping::raw("1").raw_select);
        assert_eq!(FieldMapping::alias("source", Some("Source")).source.kind(), "alias");
    }
}
