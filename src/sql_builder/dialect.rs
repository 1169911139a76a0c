use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::SqlBuildError;

/// SQL dialect for statement generation.
///
/// Both dialects share the same statement skeleton; they only differ in how
/// an inline single-valued relation is packed into one JSON column.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SqlDialect {
    #[serde(rename = "sqlite")]
    #[default]
    SQLite,

    #[serde(rename = "postgresql")]
    PostgreSQL,
}

impl SqlDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlDialect::SQLite => "sqlite",
            SqlDialect::PostgreSQL => "postgresql",
        }
    }

    /// Build a JSON object expression from `(key, expression)` pairs.
    pub fn json_object(&self, pairs: &[(String, String)]) -> String {
        let function = match self {
            SqlDialect::SQLite => "json_object",
            SqlDialect::PostgreSQL => "json_build_object",
        };
        let args = pairs
            .iter()
            .map(|(key, expr)| format!("{}, {}", quote_literal(key), expr))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", function, args)
    }

    /// Wrap a JSON-producing sub-expression so that an enclosing
    /// `json_object` embeds it as a document rather than as a string.
    pub fn embed_json(&self, expr: &str) -> String {
        match self {
            SqlDialect::SQLite => format!("json({})", expr),
            SqlDialect::PostgreSQL => expr.to_string(),
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SqlDialect {
    type Err = SqlBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(SqlDialect::SQLite),
            "postgresql" | "postgres" => Ok(SqlDialect::PostgreSQL),
            other => Err(SqlBuildError::UnsupportedDialect(other.to_string())),
        }
    }
}

/// Quote an identifier (table, column or label), doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `alias."column"`
pub fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", alias, quote_ident(column))
}
