//! The wire message shape (spec.md §6) and request/response classification.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A message as it appears on the wire. All structural keys are optional;
/// presence/absence is what distinguishes a request from a response and a
/// get from a call/write/release/close (spec.md §4.6, "Classification").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WireMessage {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Json>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Json>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<HashMap<String, u64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub close: Option<HashMap<String, u64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Json>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Json>,
}

/// What an incoming message is, per spec.md §4.6's classification rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Request,
    Response,
    /// Neither a request-identifier-plus-path nor a bare identifier; the
    /// dispatcher drops these.
    Unrecognized,
}

pub fn classify(msg: &WireMessage) -> Kind {
    if !msg.id.is_empty() && msg.path.is_some() {
        Kind::Request
    } else if !msg.id.is_empty() {
        Kind::Response
    } else {
        Kind::Unrecognized
    }
}

impl WireMessage {
    pub fn get(id: String, path: Vec<String>) -> Self {
        Self {
            id,
            path: Some(path),
            ..Default::default()
        }
    }

    pub fn apply(id: String, path: Vec<String>, args: Vec<Json>) -> Self {
        Self {
            id,
            path: Some(path),
            args: Some(args),
            ..Default::default()
        }
    }

    pub fn write(id: String, path: Vec<String>, value: Json) -> Self {
        Self {
            id,
            path: Some(path),
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn release(id: String, path: Vec<String>, counts: HashMap<String, u64>) -> Self {
        Self {
            id,
            path: Some(path),
            release: Some(counts),
            ..Default::default()
        }
    }

    pub fn close(id: String, path: Vec<String>, counts: HashMap<String, u64>) -> Self {
        Self {
            id,
            path: Some(path),
            close: Some(counts),
            ..Default::default()
        }
    }

    pub fn result(id: String, result: Json) -> Self {
        Self {
            id,
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn error(id: String, error: Json) -> Self {
        Self {
            id,
            error: Some(error),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_requires_both_id_and_path() {
        let msg = WireMessage::get("n1".into(), vec!["".into()]);
        assert_eq!(classify(&msg), Kind::Request);
    }

    #[test]
    fn response_has_only_id() {
        let msg = WireMessage::result("n1".into(), Json::Null);
        assert_eq!(classify(&msg), Kind::Response);
    }

    #[test]
    fn message_with_neither_is_unrecognized() {
        let msg = WireMessage::default();
        assert_eq!(classify(&msg), Kind::Unrecognized);
    }

    #[test]
    fn only_populated_keys_are_serialized() {
        let msg = WireMessage::get("n1".into(), vec!["".into()]);
        let v = serde_json::to_value(&msg).unwrap();
        let obj = v.as_object().unwrap();

        assert!(obj.contains_key("id"));
        assert!(obj.contains_key("path"));
        assert!(!obj.contains_key("args"));
        assert!(!obj.contains_key("result"));
        assert!(!obj.contains_key("error"));
    }
}
