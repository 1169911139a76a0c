//! Outbound storage interface.
//!
//! The compiler only needs one capability from storage: run a parameterized
//! statement and hand back its rows as JSON maps keyed by column label.
//! Backends are free to run several statements of one request concurrently.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::sql_builder::{qualified, QueryBuilder, SqlDialect, Statement, StatementScope};

mod errors;
mod sqlite;

pub use errors::StorageError;
pub use sqlite::SqliteStorage;

/// One result row, keyed by column label in select-list order.
pub type Row = Map<String, Value>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Dialect statements for this backend must be rendered in.
    fn dialect(&self) -> SqlDialect;

    /// Execute `statement` and return every row.
    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>, StorageError>;

    /// Fetch the first row of `table` whose `column` equals `value`.
    ///
    /// Used by transforms that enrich a value with a related row.
    async fn find_one_by(
        &self,
        table: &str,
        column: &str,
        value: Value,
    ) -> Result<Option<Row>, StorageError> {
        let statement = lookup_statement(self.dialect(), table, column, value);
        Ok(self.fetch_all(&statement).await?.into_iter().next())
    }
}

fn lookup_statement(dialect: SqlDialect, table: &str, column: &str, value: Value) -> Statement {
    let scope = StatementScope::new(dialect);
    let sql = {
        let qb = QueryBuilder::new(&scope).from_fresh(table, table);
        let alias = qb.alias().unwrap_or(table).to_string();
        qb.select(format!("{}.*", alias))
            .where_with(
                &format!("{} = :lookupValue", qualified(&alias, column)),
                [("lookupValue", value)],
            )
            .limit(1)
            .to_sql()
    };
    scope.into_statement(sql)
}
