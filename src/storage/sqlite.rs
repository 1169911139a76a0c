//! SQLite storage backend
//!
//! Uses a simple Arc<Mutex<Connection>> and runs every statement on the
//! blocking pool, since rusqlite is synchronous.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde_json::{Number, Value};

use super::{Row, Storage, StorageError};
use crate::sql_builder::{SqlDialect, Statement};

#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) a database file. `:memory:` opens an in-memory database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        log::info!("Opening SQLite database at {}", path.display());
        let conn = if path.to_str() == Some(":memory:") {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> Result<Self, StorageError> {
        Self::open(":memory:")
    }

    /// Run a batch of statements (schema setup, fixtures).
    pub fn execute_batch(&self, sql: &str) -> Result<(), StorageError> {
        self.conn
            .lock()
            .execute_batch(sql)
            .map_err(|e| StorageError::query_with_sql(e.to_string(), sql))
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }

    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>, StorageError> {
        let conn = self.conn.clone();
        let statement = statement.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            run_statement(&conn, &statement)
                .map_err(|e| StorageError::query_with_sql(e.to_string(), statement.sql.clone()))
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn run_statement(conn: &Connection, statement: &Statement) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(&statement.sql)?;

    for (name, value) in &statement.params {
        // Parameters bound for a fragment that was later discarded are skipped.
        if let Some(index) = stmt.parameter_index(&format!(":{}", name))? {
            stmt.raw_bind_parameter(index, to_sql_value(value))?;
        }
    }

    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut out = Vec::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (i, column) in columns.iter().enumerate() {
            record.insert(column.clone(), from_sql_value(row.get_ref(i)?));
        }
        out.push(record);
    }
    Ok(out)
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(BASE64.encode(bytes)),
    }
}
