//! Declarative type catalog.
//!
//! Mappings can be written in YAML instead of Rust. The YAML form lowers
//! onto the same [`RegistryBuilder`] and is validated identically.
//!
//! ```yaml
//! types:
//!   Post:
//!     table: post
//!     key: id
//!     required_columns: [id, authorId, createdAt]
//!     filter: '{alias}."deleted" = 0'
//!     fields:
//!       tags:
//!         column: tagsStr
//!         transform: split_comma
//!       bookmarked:
//!         exists: { table: bookmark, parent_column: postId }
//!         transform: null_if_not_logged_in
//!       author:
//!         relation: { type: User, parent_column: authorId, child_column: id }
//!       comments:
//!         relation: { type: Comment, many: true, parent_column: id, child_column: postId, sort: createdAt }
//!         pagination: { limit: 20 }
//!       toc: { json: true }
//! exposed:
//!   Post: { id: scalar, author: User, comments: "[Comment]" }
//! ```
//!
//! Templates (`filter`, `exists.extra`, `relation.condition`) may use
//! `{alias}` (or `{parent}` / `{child}` in relation conditions) and the
//! `:userId` placeholder, which is bound to the caller's identity.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::ConfigurationError;
use super::pagination::PaginationConfig;
use super::registry::{ExposedKind, RegistryBuilder, TypeRegistry};
use super::type_mapping::{FieldMapping, JoinStrategy, RelationMapping, TypeMapping};
use crate::query_planner::ExistsByUser;
use crate::sql_builder::{qualified, SortOrder};
use crate::transform;

/// Single or composite identity key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Identifier {
    Single(String),
    Composite(Vec<String>),
}

impl Identifier {
    pub fn columns(&self) -> Vec<String> {
        match self {
            Identifier::Single(col) => vec![col.clone()],
            Identifier::Composite(cols) => cols.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeCatalogConfig {
    #[serde(default)]
    pub types: BTreeMap<String, TypeDefinition>,
    /// Optional API-layer view: `Type -> field -> "scalar" | "Type" | "[Type]"`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exposed: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDefinition {
    pub table: Option<String>,
    pub key: Option<Identifier>,
    #[serde(default)]
    pub required_columns: Vec<String>,
    pub filter: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDefinition {
    pub column: Option<String>,
    pub raw_select: Option<String>,
    pub exists: Option<ExistsDefinition>,
    pub relation: Option<RelationDefinition>,
    pub alias: Option<AliasDefinition>,
    #[serde(default)]
    pub json: bool,
    pub transform: Option<TransformNames>,
    pub pagination: Option<PaginationDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformNames {
    One(String),
    Chain(Vec<String>),
}

impl TransformNames {
    fn names(&self) -> Vec<&str> {
        match self {
            TransformNames::One(name) => vec![name.as_str()],
            TransformNames::Chain(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExistsDefinition {
    pub table: String,
    pub parent_column: String,
    #[serde(default = "default_user_column")]
    pub user_column: String,
    #[serde(default = "default_parent_key")]
    pub parent_key: String,
    pub extra: Option<String>,
}

fn default_user_column() -> String {
    "userId".to_string()
}

fn default_parent_key() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationDefinition {
    #[serde(rename = "type")]
    pub target: String,
    #[serde(default)]
    pub many: bool,
    pub parent_column: Option<String>,
    pub child_column: Option<String>,
    /// Custom join predicate over `{parent}` and `{child}`.
    pub condition: Option<String>,
    pub sort: Option<String>,
    #[serde(default)]
    pub order: SortOrder,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AliasDefinition {
    pub field: String,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaginationDefinition {
    pub limit: usize,
    pub cursor_column: Option<String>,
}

impl TypeCatalogConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ConfigurationError::catalog_error_with_context(
                e.to_string(),
                format!("While reading {}", path.display()),
            )
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigurationError::catalog_error_with_context(e.to_string(), "While parsing type catalog YAML")
        })
    }

    /// Register every declared type (and exposed field) on `builder`.
    pub fn apply_to(&self, mut builder: RegistryBuilder) -> Result<RegistryBuilder, ConfigurationError> {
        for (type_name, definition) in &self.types {
            builder = builder.register(type_name.clone(), lower_type(type_name, definition)?);
        }
        for (type_name, fields) in &self.exposed {
            for (field, kind) in fields {
                builder = builder.expose(type_name.clone(), field.clone(), ExposedKind::parse(kind));
            }
        }
        Ok(builder)
    }

    pub fn build_registry(&self) -> Result<TypeRegistry, ConfigurationError> {
        self.apply_to(TypeRegistry::builder())?.build()
    }
}

fn lower_type(type_name: &str, definition: &TypeDefinition) -> Result<TypeMapping, ConfigurationError> {
    let mut mapping = TypeMapping::new().required(definition.required_columns.clone());
    if let Some(table) = &definition.table {
        mapping = mapping.table(table.clone());
    }
    if let Some(key) = &definition.key {
        mapping = mapping.key(key.columns());
    }
    if let Some(template) = definition.filter.clone() {
        mapping = mapping.filter(move |ctx, alias, qb| {
            qb.and_where_with(&template.replace("{alias}", alias), [("userId", ctx.user_param())])
        });
    }
    for (field, field_definition) in &definition.fields {
        mapping = mapping.field(field.clone(), lower_field(type_name, field, field_definition)?);
    }
    Ok(mapping)
}

fn lower_field(
    type_name: &str,
    field: &str,
    definition: &FieldDefinition,
) -> Result<FieldMapping, ConfigurationError> {
    let declared: Vec<&str> = [
        ("column", definition.column.is_some()),
        ("raw_select", definition.raw_select.is_some()),
        ("exists", definition.exists.is_some()),
        ("relation", definition.relation.is_some()),
        ("alias", definition.alias.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, present)| present.then_some(name))
    .collect();

    if declared.len() > 1 {
        return Err(ConfigurationError::ConflictingValueSources {
            type_name: type_name.to_string(),
            field: field.to_string(),
            sources: declared.join(", "),
        });
    }

    let mut mapping = if let Some(column) = &definition.column {
        FieldMapping::column(column.clone())
    } else if let Some(raw) = &definition.raw_select {
        FieldMapping::raw(raw.clone())
    } else if let Some(exists) = &definition.exists {
        let mut helper = ExistsByUser::new(exists.table.clone(), exists.parent_column.clone())
            .user_column(exists.user_column.clone())
            .parent_key(exists.parent_key.clone());
        if let Some(extra) = &exists.extra {
            helper = helper.extra(extra.clone());
        }
        helper.into_field()
    } else if let Some(relation) = &definition.relation {
        FieldMapping::relation(lower_relation(type_name, field, relation)?)
    } else if let Some(alias) = &definition.alias {
        FieldMapping::alias(alias.field.clone(), alias.type_name.as_deref())
    } else {
        FieldMapping::plain()
    };

    if definition.json {
        mapping = mapping.json();
    }

    if let Some(transforms) = &definition.transform {
        for name in transforms.names() {
            let transform = transform::named(name).ok_or_else(|| ConfigurationError::UnknownTransform {
                type_name: type_name.to_string(),
                field: field.to_string(),
                name: name.to_string(),
            })?;
            mapping = mapping.transform(transform);
        }
    }

    if let Some(pagination) = &definition.pagination {
        if pagination.limit == 0 {
            return Err(ConfigurationError::catalog_error_with_context(
                "pagination limit must be at least 1",
                format!("Field `{}.{}`", type_name, field),
            ));
        }
        let mut config = PaginationConfig::new(pagination.limit);
        if let Some(column) = &pagination.cursor_column {
            config = config.with_time_cursor(column.clone());
        }
        mapping = mapping.paginate(config);
    }

    Ok(mapping)
}

fn lower_relation(
    type_name: &str,
    field: &str,
    definition: &RelationDefinition,
) -> Result<RelationMapping, ConfigurationError> {
    let context = || format!("Relation `{}.{}`", type_name, field);

    let join = match (
        &definition.parent_column,
        &definition.child_column,
        &definition.condition,
    ) {
        (Some(parent), Some(child), None) => match definition.limit {
            None => JoinStrategy::columns(parent.clone(), child.clone()),
            Some(limit) => {
                let (parent, child) = (parent.clone(), child.clone());
                JoinStrategy::custom(move |_ctx, parent_alias, child_alias, qb| {
                    qb.and_where(format!(
                        "{} = {}",
                        qualified(child_alias, &child),
                        qualified(parent_alias, &parent)
                    ))
                    .limit(limit)
                })
            }
        },
        (None, None, Some(condition)) => {
            let (condition, limit) = (condition.clone(), definition.limit);
            JoinStrategy::custom(move |ctx, parent_alias, child_alias, qb| {
                let predicate = condition
                    .replace("{parent}", parent_alias)
                    .replace("{child}", child_alias);
                let qb = qb.and_where_with(&predicate, [("userId", ctx.user_param())]);
                match limit {
                    Some(limit) => qb.limit(limit),
                    None => qb,
                }
            })
        }
        (_, _, Some(_)) => {
            return Err(ConfigurationError::catalog_error_with_context(
                "`condition` cannot be combined with `parent_column`/`child_column`",
                context(),
            ))
        }
        _ => {
            return Err(ConfigurationError::catalog_error_with_context(
                "either both `parent_column` and `child_column` or a `condition` is required",
                context(),
            ))
        }
    };

    let mut relation = if definition.many {
        RelationMapping::many(definition.target.clone(), join)
    } else {
        RelationMapping::one(definition.target.clone(), join)
    };
    if let Some(sort) = &definition.sort {
        relation = relation.sort(sort.clone(), definition.order);
    }
    Ok(relation)
}
