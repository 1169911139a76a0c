//! Pagination of many-relations.
//!
//! Pages are sentinel-based: no count query is issued. A relation fetches
//! at most `limit` children per parent, and a full page is reported as
//! possibly having more. Backward paging is not implemented; the previous
//! page flag is a caller policy constant.

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::utils::parse_timestamp;

pub type HasNextPageFn = Arc<dyn Fn(usize) -> bool + Send + Sync>;
pub type HasPreviousPageFn = Arc<dyn Fn() -> bool + Send + Sync>;
pub type CursorFn = Arc<dyn Fn(&Map<String, Value>) -> Option<String> + Send + Sync>;

const TIME_CURSOR_PREFIX: &str = "time:";

#[derive(Clone)]
pub struct PaginationConfig {
    pub limit: usize,
    /// `None` is the sentinel rule over `limit`.
    has_next_page: Option<HasNextPageFn>,
    has_previous_page: HasPreviousPageFn,
    cursor_from_node: CursorFn,
    /// Columns the cursor function reads; fetched for every child even when
    /// not requested.
    cursor_columns: Vec<String>,
}

impl PaginationConfig {
    /// Sentinel paging with a time cursor over `createdAt`.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            has_next_page: None,
            has_previous_page: Arc::new(|| false),
            cursor_from_node: time_cursor_from("createdAt"),
            cursor_columns: vec!["createdAt".to_string()],
        }
    }

    pub fn with_time_cursor(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        self.cursor_from_node = time_cursor_from(&column);
        self.cursor_columns = vec![column];
        self
    }

    pub fn with_cursor<F>(mut self, columns: Vec<String>, cursor: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Option<String> + Send + Sync + 'static,
    {
        self.cursor_from_node = Arc::new(cursor);
        self.cursor_columns = columns;
        self
    }

    pub fn with_has_next_page<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) -> bool + Send + Sync + 'static,
    {
        self.has_next_page = Some(Arc::new(f));
        self
    }

    pub fn with_has_previous_page<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.has_previous_page = Arc::new(f);
        self
    }

    pub fn has_next_page(&self, fetched: usize) -> bool {
        match &self.has_next_page {
            Some(f) => f(fetched),
            None => fetched == self.limit,
        }
    }

    /// The same paging over a page no larger than `page_size`, for relations
    /// whose own limit is tighter than the configured one.
    pub fn capped(&self, page_size: usize) -> Self {
        Self {
            limit: self.limit.min(page_size),
            ..self.clone()
        }
    }

    pub fn has_previous_page(&self) -> bool {
        (self.has_previous_page)()
    }

    pub fn cursor(&self, node: &Map<String, Value>) -> Option<String> {
        (self.cursor_from_node)(node)
    }

    pub fn cursor_columns(&self) -> &[String] {
        &self.cursor_columns
    }
}

impl fmt::Debug for PaginationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaginationConfig")
            .field("limit", &self.limit)
            .field("cursor_columns", &self.cursor_columns)
            .finish()
    }
}

fn time_cursor_from(column: &str) -> CursorFn {
    let column = column.to_string();
    Arc::new(move |node| {
        node.get(&column)
            .and_then(parse_timestamp)
            .map(|dt| time_cursor(&dt))
    })
}

/// `base64("time:<epoch-ms>")`
pub fn time_cursor(at: &DateTime<Utc>) -> String {
    BASE64.encode(format!("{}{}", TIME_CURSOR_PREFIX, at.timestamp_millis()))
}

/// Epoch milliseconds encoded in a time cursor.
pub fn decode_time_cursor(cursor: &str) -> Option<i64> {
    let bytes = BASE64.decode(cursor).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    text.strip_prefix(TIME_CURSOR_PREFIX)?.parse().ok()
}
