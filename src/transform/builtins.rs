//! Built-in transforms and the named library the declarative catalog
//! resolves `transform:` entries against.
//!
//! Names take an optional argument after a colon:
//! `null_if_not_same_user_by:userId`, `lookup:source.id`.

use std::collections::HashMap;

use chrono::SecondsFormat;
use lazy_static::lazy_static;
use serde_json::{json, Value};

use super::{JsonMap, Transform, TransformError};
use crate::context::Context;
use crate::utils::{identity_key, parse_timestamp, truthy};

type Factory = fn(Option<&str>) -> Option<Transform>;

lazy_static! {
    static ref NAMED_TRANSFORMS: HashMap<&'static str, Factory> = {
        let mut m: HashMap<&'static str, Factory> = HashMap::new();
        m.insert("null_if_not_logged_in", |_| Some(null_if_not_logged_in()));
        m.insert("null_if_not_same_user", |_| Some(null_if_not_same_user()));
        m.insert("null_if_not_same_user_by", |arg| arg.map(null_if_not_same_user_by));
        m.insert("premium_only", |_| Some(premium_only()));
        m.insert("to_date", |_| Some(to_date()));
        m.insert("split_comma", |_| Some(split_comma()));
        m.insert("to_bool", |_| Some(to_bool()));
        m.insert("negate", |_| Some(negate()));
        m.insert("positive", |_| Some(positive()));
        m.insert("array_length", |_| Some(array_length()));
        m.insert("lookup", |arg| {
            let (table, column) = arg?.split_once('.')?;
            Some(lookup(table, column))
        });
        m
    };
}

/// Resolve a transform by name. `None` when the name is unknown or a
/// required argument is missing.
pub fn named(entry: &str) -> Option<Transform> {
    let (name, arg) = match entry.split_once(':') {
        Some((name, arg)) => (name.trim(), Some(arg.trim())),
        None => (entry.trim(), None),
    };
    NAMED_TRANSFORMS.get(name).and_then(|factory| factory(arg))
}

pub fn transform_names() -> Vec<&'static str> {
    let mut names: Vec<_> = NAMED_TRANSFORMS.keys().copied().collect();
    names.sort_unstable();
    names
}

pub fn null_if_not_logged_in() -> Transform {
    Transform::sync(|value, ctx, _| Ok(if ctx.is_logged_in() { value } else { Value::Null }))
}

/// Keep the value only when the caller is the parent object (`parent.id`).
pub fn null_if_not_same_user() -> Transform {
    null_if_not_same_user_by("id")
}

/// Keep the value only when the caller's id equals `parent[column]`.
pub fn null_if_not_same_user_by(column: &str) -> Transform {
    let column = column.to_string();
    Transform::sync(move |value, ctx, parent| {
        Ok(if same_user(ctx, parent, &column) {
            value
        } else {
            Value::Null
        })
    })
}

fn same_user(ctx: &Context, parent: &JsonMap, column: &str) -> bool {
    match (&ctx.user_id, parent.get(column).and_then(identity_key)) {
        (Some(user_id), Some(owner)) => *user_id == owner,
        _ => false,
    }
}

pub fn premium_only() -> Transform {
    Transform::sync(|value, ctx, _| Ok(if ctx.premium { value } else { Value::Null }))
}

/// Normalise a stored timestamp to RFC 3339 with millisecond precision.
pub fn to_date() -> Transform {
    Transform::sync(|value, _, _| {
        if value.is_null() {
            return Ok(Value::Null);
        }
        parse_timestamp(&value)
            .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)))
            .ok_or_else(|| TransformError::unexpected("timestamp", &value))
    })
}

pub fn split_comma() -> Transform {
    Transform::sync(|value, _, _| match value {
        Value::Null => Ok(json!([])),
        Value::String(s) if s.is_empty() => Ok(json!([])),
        Value::String(s) => Ok(Value::Array(
            s.split(',').map(|part| Value::String(part.to_string())).collect(),
        )),
        other => Err(TransformError::unexpected("comma separated string", &other)),
    })
}

pub fn to_bool() -> Transform {
    Transform::sync(|value, _, _| {
        if value.is_null() {
            return Ok(Value::Null);
        }
        truthy(&value)
            .map(Value::Bool)
            .ok_or_else(|| TransformError::unexpected("boolean", &value))
    })
}

pub fn negate() -> Transform {
    Transform::sync(|value, _, _| {
        if value.is_null() {
            return Ok(Value::Null);
        }
        truthy(&value)
            .map(|b| Value::Bool(!b))
            .ok_or_else(|| TransformError::unexpected("boolean", &value))
    })
}

/// `value > 0`; missing counts as zero.
pub fn positive() -> Transform {
    Transform::sync(|value, _, _| match &value {
        Value::Null => Ok(Value::Bool(false)),
        Value::Number(n) => Ok(Value::Bool(n.as_f64().unwrap_or_default() > 0.0)),
        Value::Bool(b) => Ok(Value::Bool(*b)),
        other => Err(TransformError::unexpected("number", other)),
    })
}

/// Length of an array value. Arrays stored as JSON text are parsed first.
pub fn array_length() -> Transform {
    Transform::sync(|value, _, _| match &value {
        Value::Null => Ok(json!(0)),
        Value::Array(items) => Ok(json!(items.len())),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => Ok(json!(items.len())),
            _ => Err(TransformError::unexpected("array", &value)),
        },
        other => Err(TransformError::unexpected("array", other)),
    })
}

/// Replace a key with the first row of `table` whose `column` matches it.
pub fn lookup(table: &str, column: &str) -> Transform {
    let table = table.to_string();
    let column = column.to_string();
    Transform::from_async(move |value, ctx, _parent| {
        let table = table.clone();
        let column = column.clone();
        Box::pin(async move {
            if value.is_null() {
                return Ok(Value::Null);
            }
            let row = ctx.storage().find_one_by(&table, &column, value).await?;
            Ok(row.map(Value::Object).unwrap_or(Value::Null))
        })
    })
}
