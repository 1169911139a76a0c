//! Transform pipeline
//!
//! A transform is a post-fetch function `(value, context, parent) -> value`
//! attached to a field. It runs after the value is fetched and parsed and
//! after its parent object is fully built, so it may look at sibling fields
//! (`parent`) and at the caller (`context`). Transforms may be synchronous
//! or asynchronous (e.g. enrich a value with a related row from storage).
//!
//! Returning `null` is the redaction idiom: "the caller may not see this",
//! as opposed to a value that does not exist. A transform error fails the
//! whole request.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use crate::context::Context;

mod builtins;
mod errors;

pub use builtins::{
    array_length, lookup, named, negate, null_if_not_logged_in, null_if_not_same_user,
    null_if_not_same_user_by, positive, premium_only, split_comma, to_bool, to_date,
    transform_names,
};
pub use errors::TransformError;

pub type JsonMap = Map<String, Value>;
pub type TransformFuture<'a> = BoxFuture<'a, Result<Value, TransformError>>;

type SyncFn = dyn Fn(Value, &Context, &JsonMap) -> Result<Value, TransformError> + Send + Sync;
type AsyncFn = dyn for<'a> Fn(Value, &'a Context, &'a JsonMap) -> TransformFuture<'a> + Send + Sync;

#[derive(Clone)]
pub enum Transform {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
    /// Apply the first transform, then feed its output to the second.
    Chain(Arc<Transform>, Arc<Transform>),
}

impl Transform {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Value, &Context, &JsonMap) -> Result<Value, TransformError> + Send + Sync + 'static,
    {
        Transform::Sync(Arc::new(f))
    }

    /// Wrap an async transform. Pass a `fn` item so the returned future can
    /// borrow the context and parent:
    ///
    /// ```ignore
    /// fn enrich<'a>(value: Value, ctx: &'a Context, _: &'a JsonMap) -> TransformFuture<'a> {
    ///     Box::pin(async move { ... })
    /// }
    /// let t = Transform::from_async(enrich);
    /// ```
    pub fn from_async<F>(f: F) -> Self
    where
        F: for<'a> Fn(Value, &'a Context, &'a JsonMap) -> TransformFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        Transform::Async(Arc::new(f))
    }

    pub fn then(self, next: Transform) -> Self {
        Transform::Chain(Arc::new(self), Arc::new(next))
    }

    pub fn apply<'a>(
        &'a self,
        value: Value,
        ctx: &'a Context,
        parent: &'a JsonMap,
    ) -> TransformFuture<'a> {
        match self {
            Transform::Sync(f) => {
                let result = f(value, ctx, parent);
                Box::pin(async move { result })
            }
            Transform::Async(f) => f(value, ctx, parent),
            Transform::Chain(first, second) => Box::pin(async move {
                let intermediate = first.apply(value, ctx, parent).await?;
                second.apply(intermediate, ctx, parent).await
            }),
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Sync(_) => f.write_str("Transform::Sync(..)"),
            Transform::Async(_) => f.write_str("Transform::Async(..)"),
            Transform::Chain(a, b) => f.debug_tuple("Transform::Chain").field(a).field(b).finish(),
        }
    }
}
