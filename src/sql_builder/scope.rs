//! Statement scope: the state shared by every builder that contributes to a
//! single statement.
//!
//! A scope owns two things:
//! - the alias counter, so every nesting level gets an alias that is unique
//!   within the statement (`post_1`, `source_2`, `source_member_3`, ...)
//! - the named-parameter set, so sub-queries built by different schema
//!   callbacks can reuse a parameter name (`:userId`, `:role`) without
//!   clobbering each other's values
//!
//! A scope lives for exactly one statement and is consumed by
//! [`StatementScope::into_statement`]. It is deliberately `!Sync`; builders
//! are never shared across statements or across await points.

use std::cell::{Cell, RefCell};

use serde::Serialize;
use serde_json::Value;

use super::builder::placeholder_names;
use super::dialect::SqlDialect;
use super::errors::SqlBuildError;

/// A finished, parameterized statement ready for storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub sql: String,
    /// Named parameters in binding order. Names carry no `:` prefix.
    pub params: Vec<(String, Value)>,
    /// Every alias minted while building this statement.
    pub aliases: Vec<String>,
}

impl Statement {
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, value)| value)
    }

    /// Fail if the SQL references a placeholder no parameter was bound for.
    pub fn verify_bound(&self) -> Result<(), SqlBuildError> {
        match placeholder_names(&self.sql)
            .into_iter()
            .find(|name| self.param(name).is_none())
        {
            Some(name) => Err(SqlBuildError::UnboundParameter(name)),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
pub struct StatementScope {
    dialect: SqlDialect,
    next_alias: Cell<usize>,
    aliases: RefCell<Vec<String>>,
    params: RefCell<Vec<(String, Value)>>,
}

impl StatementScope {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            next_alias: Cell::new(1),
            aliases: RefCell::new(Vec::new()),
            params: RefCell::new(Vec::new()),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Mint an alias derived from `hint` (usually a type name) and the
    /// statement's monotonically increasing counter.
    pub fn alias_for(&self, hint: &str) -> String {
        let n = self.next_alias.get();
        self.next_alias.set(n + 1);
        let alias = format!("{}_{}", to_snake_case(hint), n);
        self.aliases.borrow_mut().push(alias.clone());
        alias
    }

    /// Bind a named parameter and return the name it was bound under.
    ///
    /// Re-binding an existing name with an equal value reuses it. Binding it
    /// with a different value mints `name_2`, `name_3`, ... instead.
    pub fn bind(&self, name: &str, value: Value) -> String {
        let mut params = self.params.borrow_mut();
        let mut candidate = name.to_string();
        let mut suffix = 1;
        loop {
            match params.iter().find(|(existing, _)| *existing == candidate) {
                None => {
                    params.push((candidate.clone(), value));
                    return candidate;
                }
                Some((_, bound)) if *bound == value => return candidate,
                Some(_) => {
                    suffix += 1;
                    candidate = format!("{}_{}", name, suffix);
                }
            }
        }
    }

    pub fn aliases(&self) -> Vec<String> {
        self.aliases.borrow().clone()
    }

    pub fn into_statement(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params.into_inner(),
            aliases: self.aliases.into_inner(),
        }
    }
}

/// `SourceMember` -> `source_member`, anything that is not alphanumeric
/// becomes `_`.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else if ch.is_ascii_alphanumeric() {
            out.push(ch);
            prev_lower = true;
        } else {
            out.push('_');
            prev_lower = false;
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 't');
    }
    out
}
