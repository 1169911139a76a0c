//! Incremental, alias-aware builder of parameterized SQL.
//!
//! Builders are consumed and returned by every clause method, so schema
//! callbacks read naturally:
//!
//! ```ignore
//! qb.select("1")
//!     .from_fresh("bookmark", "Bookmark")
//!     .where_with(r#"bookmark_4."userId" = :userId"#, [("userId", json!(ctx.user_id))])
//!     .get_query()
//! ```
//!
//! Every builder borrows the [`StatementScope`] of the statement it belongs
//! to. `subquery()` hands out a fresh builder over the same scope, which is
//! how a sub-query embedded in `EXISTS (...)` or a select item shares the
//! alias counter and parameter set of its enclosing statement.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dialect::quote_ident;
use super::errors::SqlBuildError;
use super::scope::StatementScope;

lazy_static! {
    // Quoted literals, quoted identifiers and `::` casts match as whole
    // tokens without a name group, so nothing inside them is a placeholder.
    static ref PLACEHOLDER: Regex = Regex::new(
        r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|::|:(\.\.\.)?([A-Za-z_][A-Za-z0-9_]*)"#
    )
    .expect("placeholder pattern is valid");
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl SortOrder {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expression: String,
    pub col_alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    pub on: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QueryBuilder<'s> {
    scope: &'s StatementScope,
    select: Vec<SelectItem>,
    from: Option<(String, String)>,
    joins: Vec<Join>,
    conditions: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
}

impl<'s> QueryBuilder<'s> {
    pub fn new(scope: &'s StatementScope) -> Self {
        Self {
            scope,
            select: Vec::new(),
            from: None,
            joins: Vec::new(),
            conditions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn scope(&self) -> &'s StatementScope {
        self.scope
    }

    /// A fresh builder sharing this statement's aliases and parameters.
    pub fn subquery(&self) -> QueryBuilder<'s> {
        QueryBuilder::new(self.scope)
    }

    /// Alias of the main FROM source, if one was set.
    pub fn alias(&self) -> Option<&str> {
        self.from.as_ref().map(|(_, alias)| alias.as_str())
    }

    /// Mint a statement-unique alias without attaching it to anything.
    pub fn fresh_alias(&self, hint: &str) -> String {
        self.scope.alias_for(hint)
    }

    /// Replace the select list with a single expression.
    pub fn select(mut self, expression: impl Into<String>) -> Self {
        self.select = vec![SelectItem {
            expression: expression.into(),
            col_alias: None,
        }];
        self
    }

    pub fn add_select(mut self, expression: impl Into<String>) -> Self {
        self.select.push(SelectItem {
            expression: expression.into(),
            col_alias: None,
        });
        self
    }

    pub fn add_select_as(mut self, expression: impl Into<String>, label: impl Into<String>) -> Self {
        self.select.push(SelectItem {
            expression: expression.into(),
            col_alias: Some(label.into()),
        });
        self
    }

    pub fn selects(&self) -> &[SelectItem] {
        &self.select
    }

    /// Remove and return every labelled select item as `(label, expression)`.
    pub fn take_labelled_selects(&mut self) -> Vec<(String, String)> {
        let (labelled, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.select)
            .into_iter()
            .partition(|item| item.col_alias.is_some());
        self.select = rest;
        labelled
            .into_iter()
            .filter_map(|item| item.col_alias.map(|label| (label, item.expression)))
            .collect()
    }

    pub fn from(mut self, table: &str, alias: &str) -> Self {
        self.from = Some((quote_ident(table), alias.to_string()));
        self
    }

    /// FROM `table` under an alias minted from `hint`.
    pub fn from_fresh(self, table: &str, hint: &str) -> Self {
        let alias = self.scope.alias_for(hint);
        self.from(table, &alias)
    }

    pub fn inner_join(self, table: &str, alias: &str, on: impl Into<String>) -> Self {
        self.push_join(JoinKind::Inner, table, alias, Some(on.into()))
    }

    pub fn inner_join_with<K: Into<String>>(
        self,
        table: &str,
        alias: &str,
        on: &str,
        params: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        let on = self.bind_template(on, params);
        self.push_join(JoinKind::Inner, table, alias, Some(on))
    }

    pub fn left_join(self, table: &str, alias: &str, on: impl Into<String>) -> Self {
        self.push_join(JoinKind::Left, table, alias, Some(on.into()))
    }

    pub fn cross_join(self, table: &str, alias: &str) -> Self {
        self.push_join(JoinKind::Cross, table, alias, None)
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Conjoin a condition. `where_` and `and_where` both conjoin; a
    /// condition added earlier (a visibility filter, say) is never dropped.
    pub fn where_(self, condition: impl Into<String>) -> Self {
        self.and_where(condition)
    }

    pub fn where_with<K: Into<String>>(
        self,
        condition: &str,
        params: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        self.and_where_with(condition, params)
    }

    pub fn and_where(mut self, condition: impl Into<String>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    pub fn and_where_with<K: Into<String>>(
        mut self,
        condition: &str,
        params: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        let condition = self.bind_template(condition, params);
        self.conditions.push(condition);
        self
    }

    /// Disjoin a condition with everything conjoined so far.
    pub fn or_where(mut self, condition: impl Into<String>) -> Self {
        let condition = condition.into();
        if self.conditions.is_empty() {
            self.conditions.push(condition);
        } else {
            let existing = render_conditions(&self.conditions);
            self.conditions = vec![format!("({}) OR ({})", existing, condition)];
        }
        self
    }

    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    pub fn order_by(self, expression: impl Into<String>) -> Self {
        self.order_by_dir(expression, SortOrder::Asc)
    }

    pub fn order_by_dir(mut self, expression: impl Into<String>, order: SortOrder) -> Self {
        self.order_by
            .push(format!("{} {}", expression.into(), order.to_sql()));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// Remove and return ORDER BY terms and LIMIT, for callers that move
    /// ordering into a window function.
    pub fn take_ordering(&mut self) -> (Vec<String>, Option<u64>) {
        (std::mem::take(&mut self.order_by), self.limit.take())
    }

    /// Render as a top-level statement body, requiring FROM and a select list.
    pub fn render(&self) -> Result<String, SqlBuildError> {
        if self.from.is_none() {
            return Err(SqlBuildError::MissingFrom);
        }
        if self.select.is_empty() {
            return Err(SqlBuildError::EmptySelect);
        }
        Ok(self.to_sql())
    }

    pub fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.select.is_empty() {
            sql.push('1');
        } else {
            let items = self
                .select
                .iter()
                .map(|item| match &item.col_alias {
                    Some(label) => format!("{} AS {}", item.expression, quote_ident(label)),
                    None => item.expression.clone(),
                })
                .collect::<Vec<_>>();
            sql.push_str(&items.join(", "));
        }

        if let Some((table, alias)) = &self.from {
            sql.push_str(&format!(" FROM {} {}", table, alias));
        }

        for join in &self.joins {
            match (join.kind, &join.on) {
                (JoinKind::Cross, _) | (_, None) => {
                    sql.push_str(&format!(" CROSS JOIN {} {}", join.table, join.alias))
                }
                (JoinKind::Inner, Some(on)) => {
                    sql.push_str(&format!(" INNER JOIN {} {} ON {}", join.table, join.alias, on))
                }
                (JoinKind::Left, Some(on)) => {
                    sql.push_str(&format!(" LEFT JOIN {} {} ON {}", join.table, join.alias, on))
                }
            }
        }

        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_conditions(&self.conditions));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql
    }

    /// The finished fragment in parentheses, for embedding as a sub-query.
    /// Parameters are already bound into the shared scope.
    pub fn get_query(self) -> String {
        format!("({})", self.to_sql())
    }

    fn push_join(mut self, kind: JoinKind, table: &str, alias: &str, on: Option<String>) -> Self {
        self.joins.push(Join {
            kind,
            table: quote_ident(table),
            alias: alias.to_string(),
            on,
        });
        self
    }

    fn bind_template<K: Into<String>>(
        &self,
        template: &str,
        params: impl IntoIterator<Item = (K, Value)>,
    ) -> String {
        let params: Vec<(String, Value)> = params
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();
        bind_template(self.scope, template, &params)
    }
}

/// Names of every `:name` placeholder in `sql`, excluding `::type` casts
/// and anything inside quotes.
pub(crate) fn placeholder_names(sql: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(sql)
        .filter_map(|caps| caps.get(2).map(|name| name.as_str().to_string()))
        .collect()
}

fn render_conditions(conditions: &[String]) -> String {
    if conditions.len() == 1 {
        return conditions[0].clone();
    }
    conditions
        .iter()
        .map(|c| format!("({})", c))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Rewrite `:name` and `:...name` placeholders in `template` to the names
/// they were bound under in `scope`. Placeholders with no matching entry in
/// `params` are left untouched, as are `::type` casts and quoted text.
pub(crate) fn bind_template(
    scope: &StatementScope,
    template: &str,
    params: &[(String, Value)],
) -> String {
    if params.is_empty() {
        return template.to_string();
    }

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let name = name.as_str();
        let Some((_, value)) = params.iter().find(|(param, _)| param == name) else {
            continue;
        };

        out.push_str(&template[last..whole.start()]);
        match (caps.get(1).is_some(), value) {
            (true, Value::Array(items)) if items.is_empty() => out.push_str("NULL"),
            (true, Value::Array(items)) => {
                let names = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        format!(":{}", scope.bind(&format!("{}_{}", name, i), item.clone()))
                    })
                    .collect::<Vec<_>>();
                out.push_str(&names.join(", "));
            }
            _ => {
                out.push(':');
                out.push_str(&scope.bind(name, value.clone()));
            }
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);
    out
}
