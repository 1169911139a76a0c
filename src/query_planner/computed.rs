//! Shared helper for "did the caller do X to this object" fields.

use crate::context::Context;
use crate::sql_builder::{qualified, QueryBuilder};
use crate::transform::to_bool;
use crate::type_catalog::FieldMapping;

/// `EXISTS (SELECT 1 FROM <table> WHERE <user_column> = :userId AND
/// <parent_column> = <parent alias>.<parent_key> [AND <extra>])`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistsByUser {
    pub table: String,
    pub parent_column: String,
    pub user_column: String,
    pub parent_key: String,
    /// Extra predicate; `{alias}` is the sub-query's alias.
    pub extra: Option<String>,
}

impl ExistsByUser {
    pub fn new(table: impl Into<String>, parent_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            parent_column: parent_column.into(),
            user_column: "userId".to_string(),
            parent_key: "id".to_string(),
            extra: None,
        }
    }

    pub fn user_column(mut self, column: impl Into<String>) -> Self {
        self.user_column = column.into();
        self
    }

    pub fn parent_key(mut self, column: impl Into<String>) -> Self {
        self.parent_key = column.into();
        self
    }

    pub fn extra(mut self, predicate: impl Into<String>) -> Self {
        self.extra = Some(predicate.into());
        self
    }

    pub fn render(&self, ctx: &Context, alias: &str, qb: QueryBuilder<'_>) -> String {
        let qb = qb.from_fresh(&self.table, &self.table);
        let sub = qb.alias().unwrap_or(&self.table).to_string();
        let mut query = qb
            .select("1")
            .where_with(
                &format!("{} = :userId", qualified(&sub, &self.user_column)),
                [("userId", ctx.user_param())],
            )
            .and_where(format!(
                "{} = {}",
                qualified(&sub, &self.parent_column),
                qualified(alias, &self.parent_key)
            ));
        if let Some(extra) = &self.extra {
            query = query.and_where_with(&extra.replace("{alias}", &sub), [("userId", ctx.user_param())]);
        }
        format!("EXISTS {}", query.get_query())
    }

    /// A computed field rendering this check, coerced to a boolean.
    pub fn into_field(self) -> FieldMapping {
        FieldMapping::computed(move |ctx, alias, qb| self.render(ctx, alias, qb)).transform(to_bool())
    }
}
