use thiserror::Error;

/// Failures surfaced by a storage backend. The engine reports any of these
/// as a single data-fetch failure for the whole request and never retries.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("Storage connection failed: {0}")]
    Connection(String),

    #[error("Statement failed: {message}\n  SQL: {sql}")]
    Query { message: String, sql: String },

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl StorageError {
    pub fn query_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        StorageError::Query {
            message: message.into(),
            sql: sql.into(),
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Query {
            message: e.to_string(),
            sql: String::new(),
        }
    }
}
