//! Type mapping registry
//!
//! Built once at startup through [`RegistryBuilder`], which validates every
//! mapping eagerly, then shared read-only. Lookups take `&self` and the
//! registry holds no interior mutability, so any number of concurrent
//! requests may read it without locking.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::OnceCell;

use super::errors::ConfigurationError;
use super::type_mapping::{FieldMapping, FieldSource, RelationMapping, TypeMapping};
use crate::transform::Transform;

/// How the API layer exposes a field: used to cross-check mappings at
/// build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExposedKind {
    Scalar,
    Object(String),
    List(String),
}

impl ExposedKind {
    /// `"scalar"`, `"Type"` or `"[Type]"`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.eq_ignore_ascii_case("scalar") {
            ExposedKind::Scalar
        } else if let Some(inner) = s.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            ExposedKind::List(inner.trim().to_string())
        } else {
            ExposedKind::Object(s.to_string())
        }
    }

    fn describe(&self) -> String {
        match self {
            ExposedKind::Scalar => "scalar".to_string(),
            ExposedKind::Object(t) => format!("single `{}`", t),
            ExposedKind::List(t) => format!("list of `{}`", t),
        }
    }
}

/// A field after alias resolution.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedField<'r> {
    /// Mapping the value is produced by. `None` for an unmapped identity
    /// column named like the field.
    pub mapping: Option<&'r FieldMapping>,
    /// Name of the mapping field (differs from the requested name for aliases).
    pub field: &'r str,
    /// Overrides the relation target for aliases that view it as another type.
    pub target_override: Option<&'r str>,
    /// The alias field itself, whose decorations stack on the target's.
    pub alias: Option<&'r FieldMapping>,
}

impl<'r> ResolvedField<'r> {
    pub fn relation(&self) -> Option<&'r RelationMapping> {
        self.mapping.and_then(FieldMapping::as_relation)
    }

    pub fn relation_target(&self) -> Option<&'r str> {
        self.relation()
            .map(|r| self.target_override.unwrap_or(r.target.as_str()))
    }

    /// Target transform first, then the alias's own.
    pub fn transform(&self) -> Option<Transform> {
        let target = self.mapping.and_then(|m| m.transform.clone());
        let own = self.alias.and_then(|m| m.transform.clone());
        match (target, own) {
            (Some(first), Some(second)) => Some(first.then(second)),
            (first, second) => first.or(second),
        }
    }

    pub fn json(&self) -> bool {
        [self.mapping, self.alias]
            .into_iter()
            .flatten()
            .any(|m| m.json)
    }
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeMapping>,
    exposed: Option<HashMap<String, HashMap<String, ExposedKind>>>,
}

impl TypeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn lookup(&self, type_name: &str) -> Result<&TypeMapping, ConfigurationError> {
        self.types
            .get(type_name)
            .ok_or_else(|| ConfigurationError::unknown_type(type_name))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a requested field of `type_name`, following one alias hop.
    ///
    /// Fields absent from the mapping resolve as identity columns, unless the
    /// registry carries an exposed catalog that does not list them.
    pub fn resolve_field<'r>(
        &'r self,
        type_name: &str,
        field: &'r str,
    ) -> Result<ResolvedField<'r>, ConfigurationError> {
        let mapping = self.lookup(type_name)?;

        if let Some(exposed) = &self.exposed {
            let listed = exposed
                .get(type_name)
                .map(|fields| fields.contains_key(field))
                .unwrap_or(false);
            if !listed {
                return Err(unknown_field(type_name, field));
            }
        }

        let Some((name, field_mapping)) = mapping.fields.get_key_value(field) else {
            return Ok(ResolvedField {
                mapping: None,
                field,
                target_override: None,
                alias: None,
            });
        };

        match &field_mapping.source {
            FieldSource::Alias(alias) => {
                let (target_name, target) = mapping
                    .fields
                    .get_key_value(alias.field.as_str())
                    .ok_or_else(|| unknown_field(type_name, &alias.field))?;
                Ok(ResolvedField {
                    mapping: Some(target),
                    field: target_name,
                    target_override: alias.type_name.as_deref(),
                    alias: Some(field_mapping),
                })
            }
            _ => Ok(ResolvedField {
                mapping: Some(field_mapping),
                field: name,
                target_override: None,
                alias: None,
            }),
        }
    }
}

fn unknown_field(type_name: &str, field: &str) -> ConfigurationError {
    ConfigurationError::UnknownField {
        type_name: type_name.to_string(),
        field: field.to_string(),
    }
}

/// Collects mappings and validates them as a whole in [`build`](Self::build).
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    types: HashMap<String, TypeMapping>,
    exposed: Option<HashMap<String, HashMap<String, ExposedKind>>>,
    duplicates: Vec<String>,
}

impl RegistryBuilder {
    pub fn register(mut self, type_name: impl Into<String>, mapping: TypeMapping) -> Self {
        let type_name = type_name.into();
        if self.types.contains_key(&type_name) {
            self.duplicates.push(type_name);
        } else {
            self.types.insert(type_name, mapping);
        }
        self
    }

    /// Declare how the API layer exposes `type_name.field`.
    pub fn expose(
        mut self,
        type_name: impl Into<String>,
        field: impl Into<String>,
        kind: ExposedKind,
    ) -> Self {
        self.exposed
            .get_or_insert_with(HashMap::new)
            .entry(type_name.into())
            .or_default()
            .insert(field.into(), kind);
        self
    }

    pub fn build(self) -> Result<TypeRegistry, ConfigurationError> {
        if let Some(type_name) = self.duplicates.into_iter().next() {
            return Err(ConfigurationError::DuplicateType { type_name });
        }

        let mut type_names: Vec<&String> = self.types.keys().collect();
        type_names.sort();
        for type_name in &type_names {
            let mapping = &self.types[*type_name];
            let mut fields: Vec<(&String, &FieldMapping)> = mapping.fields.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            for (field, field_mapping) in fields {
                validate_field(&self.types, type_name, mapping, field, field_mapping)?;
            }
        }

        if let Some(exposed) = &self.exposed {
            validate_exposed(&self.types, exposed)?;
        }

        info!("Type registry built with {} types", self.types.len());
        debug!("Registered types: {:?}", type_names);

        Ok(TypeRegistry {
            types: self.types,
            exposed: self.exposed,
        })
    }
}

fn validate_field(
    types: &HashMap<String, TypeMapping>,
    type_name: &str,
    mapping: &TypeMapping,
    field: &str,
    field_mapping: &FieldMapping,
) -> Result<(), ConfigurationError> {
    let owned = || (type_name.to_string(), field.to_string());

    if field_mapping.raw_select && !matches!(field_mapping.source, FieldSource::Column(Some(_))) {
        let (type_name, field) = owned();
        return Err(ConfigurationError::ConflictingValueSources {
            type_name,
            field,
            sources: format!("raw_select, {}", field_mapping.source.kind()),
        });
    }

    if field_mapping.pagination.is_some() {
        match field_mapping.as_relation() {
            None => {
                let (type_name, field) = owned();
                return Err(ConfigurationError::PaginationOnNonRelation { type_name, field });
            }
            Some(relation) if !relation.many => {
                let (type_name, field) = owned();
                return Err(ConfigurationError::PaginationOnSingleRelation { type_name, field });
            }
            Some(_) => {}
        }
    }

    match &field_mapping.source {
        FieldSource::Relation(relation) => check_target(types, type_name, field, &relation.target),
        FieldSource::Alias(alias) => {
            let invalid = |reason: String| {
                let (type_name, field) = owned();
                ConfigurationError::InvalidAlias {
                    type_name,
                    field,
                    reason,
                }
            };
            if alias.field == field {
                return Err(invalid("alias points at itself".to_string()));
            }
            let target = mapping
                .fields
                .get(&alias.field)
                .ok_or_else(|| invalid(format!("field `{}` is not mapped", alias.field)))?;
            if matches!(target.source, FieldSource::Alias(_)) {
                return Err(invalid(format!("field `{}` is itself an alias", alias.field)));
            }
            if let Some(view) = &alias.type_name {
                if target.as_relation().is_none() {
                    return Err(invalid(format!(
                        "field `{}` is not a relation, cannot view it as `{}`",
                        alias.field, view
                    )));
                }
                check_target(types, type_name, field, view)?;
            }
            Ok(())
        }
        FieldSource::Column(_) | FieldSource::Computed(_) => Ok(()),
    }
}

fn check_target(
    types: &HashMap<String, TypeMapping>,
    type_name: &str,
    field: &str,
    target: &str,
) -> Result<(), ConfigurationError> {
    if types.contains_key(target) {
        Ok(())
    } else {
        Err(ConfigurationError::UnknownRelationTarget {
            type_name: type_name.to_string(),
            field: field.to_string(),
            target: target.to_string(),
        })
    }
}

fn validate_exposed(
    types: &HashMap<String, TypeMapping>,
    exposed: &HashMap<String, HashMap<String, ExposedKind>>,
) -> Result<(), ConfigurationError> {
    let mut type_names: Vec<&String> = exposed.keys().collect();
    type_names.sort();
    for type_name in type_names {
        let mapping = types
            .get(type_name)
            .ok_or_else(|| ConfigurationError::unknown_type(type_name.as_str()))?;
        let mut fields: Vec<(&String, &ExposedKind)> = exposed[type_name].iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));

        for (field, kind) in fields {
            let relation = match mapping.fields.get(field).map(|m| &m.source) {
                Some(FieldSource::Alias(alias)) => mapping
                    .fields
                    .get(&alias.field)
                    .and_then(FieldMapping::as_relation)
                    .map(|r| (r.many, alias.type_name.clone().unwrap_or_else(|| r.target.clone()))),
                Some(FieldSource::Relation(r)) => Some((r.many, r.target.clone())),
                _ => None,
            };

            let consistent = match (kind, &relation) {
                (ExposedKind::Scalar, None) => true,
                (ExposedKind::Object(_), Some((false, _))) => true,
                (ExposedKind::List(_), Some((true, _))) => true,
                _ => false,
            };

            if !consistent {
                // An object or list exposed with no mapping at all cannot be resolved.
                if relation.is_none() && !mapping.fields.contains_key(field) {
                    return Err(unknown_field(type_name, field));
                }
                return Err(ConfigurationError::RelationKindMismatch {
                    type_name: type_name.clone(),
                    field: field.clone(),
                    exposed: kind.describe(),
                    mapped: match &relation {
                        None => "scalar".to_string(),
                        Some((true, t)) => format!("list of `{}`", t),
                        Some((false, t)) => format!("single `{}`", t),
                    },
                });
            }

            if let (ExposedKind::Object(t) | ExposedKind::List(t), Some(_)) = (kind, &relation) {
                check_target(types, type_name, field, t)?;
            }
        }
    }
    Ok(())
}

/// Process-wide registry slot, set once at startup.
pub static GLOBAL_REGISTRY: OnceCell<Arc<TypeRegistry>> = OnceCell::const_new();

pub fn init_global_registry(registry: TypeRegistry) -> Result<Arc<TypeRegistry>, ConfigurationError> {
    let registry = Arc::new(registry);
    GLOBAL_REGISTRY.set(registry.clone()).map_err(|_| {
        ConfigurationError::catalog_error_with_context(
            "registry already initialized",
            "init_global_registry may only be called once per process",
        )
    })?;
    Ok(registry)
}

pub fn global_registry() -> Result<Arc<TypeRegistry>, ConfigurationError> {
    GLOBAL_REGISTRY.get().cloned().ok_or_else(|| {
        ConfigurationError::catalog_error_with_context(
            "registry not initialized",
            "call init_global_registry at startup",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql_builder::SortOrder;
    use crate::type_catalog::{JoinStrategy, PaginationConfig};

    fn comment() -> TypeMapping {
        TypeMapping::new()
            .required(["id", "postId", "createdAt"])
            .field("numUpvotes", FieldMapping::column("upvotes"))
            .field(
                "children",
                FieldMapping::relation(
                    RelationMapping::many("Comment", JoinStrategy::columns("id", "parentId"))
                        .sort("createdAt", SortOrder::Asc),
                )
                .paginate(PaginationConfig::new(50)),
            )
    }

    #[test]
    fn test_lookup_and_unknown_type() {
        let registry = TypeRegistry::builder().register("Comment", comment()).build().unwrap();
        assert!(registry.lookup("Comment").is_ok());
        assert_eq!(
            registry.lookup("Nope").unwrap_err(),
            ConfigurationError::unknown_type("Nope")
        );
    }

    #[test]
    fn test_duplicate_type_is_rejected() {
        let err = TypeRegistry::builder()
            .register("Comment", comment())
            .register("Comment", comment())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateType { .. }));
    }

    #[test]
    fn test_pagination_must_sit_on_many_relation() {
        let err = TypeRegistry::builder()
            .register(
                "Post",
                TypeMapping::new().field("title", FieldMapping::plain().paginate(PaginationConfig::new(5))),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::PaginationOnNonRelation { .. }));

        let err = TypeRegistry::builder()
            .register("User", TypeMapping::new())
            .register(
                "Post",
                TypeMapping::new().field(
                    "author",
                    FieldMapping::relation(RelationMapping::one(
                        "User",
                        JoinStrategy::columns("authorId", "id"),
                    ))
                    .paginate(PaginationConfig::new(5)),
                ),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::PaginationOnSingleRelation { .. }));
    }

    #[test]
    fn test_relation_target_must_be_registered() {
        let err = TypeRegistry::builder()
            .register(
                "Post",
                TypeMapping::new().field(
                    "author",
                    FieldMapping::relation(RelationMapping::one(
                        "User",
                        JoinStrategy::columns("authorId", "id"),
                    )),
                ),
            )
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownRelationTarget {
                type_name: "Post".into(),
                field: "author".into(),
                target: "User".into(),
            }
        );
    }

    #[test]
    fn test_alias_resolution_and_validation() {
        let source_relation = FieldMapping::relation(RelationMapping::one(
            "Source",
            JoinStrategy::columns("sourceId", "id"),
        ));
        let registry = TypeRegistry::builder()
            .register("Source", TypeMapping::new())
            .register("Publication", TypeMapping::new())
            .register(
                "Post",
                TypeMapping::new()
                    .field("source", source_relation.clone())
                    .field("publication", FieldMapping::alias("source", Some("Publication"))),
            )
            .build()
            .unwrap();

        let resolved = registry.resolve_field("Post", "publication").unwrap();
        assert_eq!(resolved.field, "source");
        assert_eq!(resolved.relation_target(), Some("Publication"));

        assert!(resolved.transform().is_none());

        let plain = registry.resolve_field("Post", "title").unwrap();
        assert!(plain.mapping.is_none());
        assert!(plain.alias.is_none());

        let err = TypeRegistry::builder()
            .register(
                "Post",
                TypeMapping::new()
                    .field("a", FieldMapping::alias("b", None))
                    .field("b", FieldMapping::alias("c", None))
                    .field("c", FieldMapping::plain()),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidAlias { .. }));
    }

    #[test]
    fn test_raw_select_only_on_columns() {
        let mut field = FieldMapping::computed(|_, _, qb| qb.select("1").get_query());
        field.raw_select = true;
        let err = TypeRegistry::builder()
            .register("Post", TypeMapping::new().field("x", field))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::ConflictingValueSources { .. }));
    }

    #[test]
    fn test_exposed_catalog_checks() {
        let registry = TypeRegistry::builder()
            .register("Comment", comment())
            .expose("Comment", "id", ExposedKind::Scalar)
            .expose("Comment", "children", ExposedKind::parse("[Comment]"))
            .build()
            .unwrap();
        assert!(registry.resolve_field("Comment", "children").is_ok());
        assert!(matches!(
            registry.resolve_field("Comment", "content"),
            Err(ConfigurationError::UnknownField { .. })
        ));

        let err = TypeRegistry::builder()
            .register("Comment", comment())
            .expose("Comment", "children", ExposedKind::parse("Comment"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::RelationKindMismatch { .. }));

        let err = TypeRegistry::builder()
            .register("Comment", comment())
            .expose("Comment", "parent", ExposedKind::parse("Comment"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownField { .. }));
    }

    #[test]
    fn test_exposed_kind_parse() {
        assert_eq!(ExposedKind::parse("scalar"), ExposedKind::Scalar);
        assert_eq!(ExposedKind::parse("[User]"), ExposedKind::List("User".into()));
        assert_eq!(ExposedKind::parse("User"), ExposedKind::Object("User".into()));
    }
}
