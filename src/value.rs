use std::sync::Arc;

use crate::handle::Handle;
use crate::remote::Remote;

/// Any value that can cross the boundary as an argument, a property value,
/// or a result.
///
/// `Json` covers primitives and structurally cloneable compounds (spec.md
/// §4.3 steps 3-4). `Handle` covers an already-remote reference being
/// passed through or passed back (the "cyclic and repeated handle passing"
/// design note). `Object` covers a local object offered for pass-by-handle,
/// which only crosses the wire if some registered `Protocol::can_handle`
/// claims it.
#[derive(Clone)]
pub enum Value {
    Json(serde_json::Value),
    Handle(Handle),
    Object(Arc<dyn Remote>),
}

impl Value {
    pub fn null() -> Self {
        Value::Json(serde_json::Value::Null)
    }

    pub fn json(v: impl Into<serde_json::Value>) -> Self {
        Value::Json(v.into())
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Best-effort conversion used only where a `Value` must be flattened
    /// into plain JSON for a fallback path (e.g. bundling multiple call
    /// arguments into a single argument for a plain closure receiver).
    /// Handles and objects, which have no JSON representation, become
    /// `null`.
    pub fn into_json_lossy(self) -> serde_json::Value {
        match self {
            Value::Json(v) => v,
            Value::Handle(_) | Value::Object(_) => serde_json::Value::Null,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Handle(a), Value::Handle(b)) => a.path() == b.path(),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Json(v) => write!(f, "Value::Json({v})"),
            Value::Handle(h) => write!(f, "Value::Handle({:?})", h.path()),
            Value::Object(_) => write!(f, "Value::Object(..)"),
        }
    }
}
