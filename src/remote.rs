use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProximateError;
use crate::value::Value;

/// A local object exposed for remote access.
///
/// This is the Rust expression of "dynamic member access" from the spec:
/// since Rust has no runtime member interception, a receiver implements the
/// three operations a remote peer can perform on it directly. A receiver
/// that is only ever called (the common case, see `tests/common/actors.rs`
/// in the teacher, where `Sum` only implements `Handler<Add>`/`Handler<Show>`)
/// need only override `call`; the default `get`/`set` reject with
/// `NotObject`, matching "invoked non-function / walked non-object" from
/// the error design.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Read a named member. Most objects that are walked (`proxy.a.b`)
    /// override this; callables usually don't need to.
    fn get(&self, _name: &str) -> Result<Value, ProximateError> {
        Err(ProximateError::NotObject)
    }

    /// Assign a named member.
    fn set(&self, _name: &str, _value: Value) -> Result<(), ProximateError> {
        Err(ProximateError::NotObject)
    }

    /// Invoke this value as a function.
    async fn call(&self, _args: Vec<Value>) -> Result<Value, ProximateError> {
        Err(ProximateError::NotCallable)
    }

    /// Down-casting hook used by protocol handlers (`Protocol::can_handle`)
    /// to recognize a concrete receiver type without the registry needing
    /// to know about it.
    fn as_any(&self) -> &dyn Any;
}

/// Convenience wrapper turning a plain closure into a [`Remote`] that is
/// only callable, the common case for pass-by-handle protocols (see S5/S6
/// in spec.md §8 and the `"fn"` protocol in `tests/scenarios.rs`).
///
/// Type-erased (`Arc<dyn Fn(..)>` rather than generic over the closure
/// type) on purpose: a `Protocol::can_handle` downcasts via `as_any`, which
/// needs one concrete type to match against regardless of which closure a
/// caller wrapped.
#[derive(Clone)]
pub struct RemoteFn(Arc<dyn Fn(Value) -> Value + Send + Sync>);

impl RemoteFn {
    pub fn new(f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        RemoteFn(Arc::new(f))
    }
}

#[async_trait]
impl Remote for RemoteFn {
    async fn call(&self, mut args: Vec<Value>) -> Result<Value, ProximateError> {
        let arg = if args.len() == 1 {
            args.pop().unwrap()
        } else {
            Value::Json(serde_json::Value::Array(
                args.into_iter().map(|v| v.into_json_lossy()).collect(),
            ))
        };

        Ok((self.0)(arg))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_argument_passes_through_unwrapped() {
        let doubled = RemoteFn::new(|v| Value::json(v.as_json().and_then(|j| j.as_i64()).unwrap_or(0) * 2));
        let result = doubled.call(vec![Value::json(21)]).await.unwrap();
        assert_eq!(result.as_json(), Some(&serde_json::json!(42)));
    }

    #[tokio::test]
    async fn multiple_arguments_are_bundled_into_a_json_array() {
        let joined = RemoteFn::new(|v| v);
        let result = joined
            .call(vec![Value::json(1), Value::json(2)])
            .await
            .unwrap();
        assert_eq!(result.as_json(), Some(&serde_json::json!([1, 2])));
    }

    #[test]
    fn default_get_and_set_reject_as_not_an_object() {
        let f = RemoteFn::new(|v| v);
        assert!(matches!(f.get("x"), Err(ProximateError::NotObject)));
        assert!(matches!(f.set("x", Value::null()), Err(ProximateError::NotObject)));
    }
}
