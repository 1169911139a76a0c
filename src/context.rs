//! Request context
//!
//! One `Context` is built per inbound request by the caller and passed by
//! reference through plan building, schema callbacks and transforms. It is
//! never stored in process-wide state, so concurrent requests cannot see
//! each other's identity.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::storage::Storage;

#[derive(Clone)]
pub struct Context {
    /// Identity of the caller, absent when not logged in.
    pub user_id: Option<String>,
    pub premium: bool,
    /// Free-form request flags available to schema callbacks.
    pub flags: HashMap<String, Value>,
    storage: Arc<dyn Storage>,
}

impl Context {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            user_id: None,
            premium: false,
            flags: HashMap::new(),
            storage,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_premium(mut self, premium: bool) -> Self {
        self.premium = premium;
        self
    }

    pub fn with_flag(mut self, name: impl Into<String>, value: Value) -> Self {
        self.flags.insert(name.into(), value);
        self
    }

    pub fn is_logged_in(&self) -> bool {
        self.user_id.is_some()
    }

    /// Caller identity as a bindable parameter value (`null` when anonymous).
    pub fn user_param(&self) -> Value {
        self.user_id
            .as_ref()
            .map(|id| Value::String(id.clone()))
            .unwrap_or(Value::Null)
    }

    pub fn flag(&self, name: &str) -> Option<&Value> {
        self.flags.get(name)
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("user_id", &self.user_id)
            .field("premium", &self.premium)
            .field("flags", &self.flags)
            .field("dialect", &self.storage.dialect())
            .finish()
    }
}
