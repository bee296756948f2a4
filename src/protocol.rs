//! Pluggable per-value codecs (spec.md §4.3, "Protocol handlers").
//!
//! A protocol is installed under a string key; the same key must be used at
//! both peers. The process-wide table is the default; a connection may
//! overlay its own table, consulted first (spec.md §4.3: "per-connection
//! overlay first, then process-wide").

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value as Json;

use crate::error::ProximateError;
use crate::handle::Handle;
use crate::remote::Remote;
use crate::value::Value;

/// The reserved key under which the built-in error protocol is installed.
/// Chosen freely per spec.md §6 but fixed at both peers, here fixed by
/// this crate.
pub const ERROR_PROTOCOL_KEY: &str = "error";

/// The reserved key the codec uses to pass an already-remote `Handle`
/// through unchanged (spec.md §9, "cyclic and repeated handle passing").
/// Reserved separately from the pluggable protocol table so a user protocol
/// can never shadow it.
pub const HANDLE_PASSTHROUGH_KEY: &str = "__handle__";

pub type Register<'a> = dyn FnMut(Arc<dyn Remote>) -> String + 'a;
pub type Mint<'a> = dyn FnMut(String) -> Handle + 'a;

/// A pluggable codec for one value kind.
pub trait Protocol: Send + Sync {
    /// Does this protocol want to handle `value`?
    fn can_handle(&self, value: &Arc<dyn Remote>) -> bool;

    /// Serialize an accepted value. `register` is `registry::inc_ref` bound
    /// to the owning connection's codec call; invoke it to mint an id for
    /// anything that should be addressable by the peer.
    fn serialize(&self, value: Arc<dyn Remote>, register: &mut Register<'_>) -> (Json, Vec<crate::transport::Transferable>);

    /// Reconstruct a value from this protocol's payload. `mint` creates a
    /// primary-level `Handle` for an id named in the payload.
    fn deserialize(&self, data: Json, mint: &mut Mint<'_>) -> Result<Value, ProximateError>;
}

/// The pass-by-handle convenience base described in spec.md §4.3: register
/// the object and emit its id; on the way back, mint a handle for that id.
/// A concrete protocol (like the `"fn"` protocol used in S5) implements
/// `can_handle` for its own value kind and delegates here for the
/// serialize/deserialize bodies.
pub fn serialize_by_handle(
    value: Arc<dyn Remote>,
    register: &mut Register<'_>,
) -> (Json, Vec<crate::transport::Transferable>) {
    let id = register(value);
    (serde_json::json!({ "id": id }), Vec::new())
}

pub fn deserialize_by_handle(data: Json, mint: &mut Mint<'_>) -> Result<Value, ProximateError> {
    let id = data
        .get("id")
        .and_then(Json::as_str)
        .ok_or_else(|| ProximateError::Malformed("pass-by-handle payload missing \"id\"".into()))?;

    Ok(Value::Handle(mint(id.to_string())))
}

/// A named table of protocol handlers.
#[derive(Default)]
pub struct ProtocolTable {
    handlers: HashMap<String, Arc<dyn Protocol>>,
}

impl ProtocolTable {
    pub fn register(&mut self, key: impl Into<String>, protocol: Arc<dyn Protocol>) {
        self.handlers.insert(key.into(), protocol);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Protocol>> {
        self.handlers.get(key).cloned()
    }

    /// Find the first registered protocol (insertion order is not
    /// meaningful; this is a small table in practice) whose `can_handle`
    /// accepts `value`.
    pub fn find_handler(&self, value: &Arc<dyn Remote>) -> Option<(String, Arc<dyn Protocol>)> {
        self.handlers
            .iter()
            .find(|(_, p)| p.can_handle(value))
            .map(|(k, p)| (k.clone(), p.clone()))
    }
}

static GLOBAL_PROTOCOLS: Lazy<RwLock<ProtocolTable>> = Lazy::new(|| RwLock::new(ProtocolTable::default()));

/// Install a protocol under `key` in the process-wide table. Both peers
/// must install the same key for the same payload shape.
pub fn register_global(key: impl Into<String>, protocol: Arc<dyn Protocol>) {
    GLOBAL_PROTOCOLS.write().register(key, protocol);
}

pub fn global_get(key: &str) -> Option<Arc<dyn Protocol>> {
    GLOBAL_PROTOCOLS.read().get(key)
}

pub fn global_find_handler(value: &Arc<dyn Remote>) -> Option<(String, Arc<dyn Protocol>)> {
    GLOBAL_PROTOCOLS.read().find_handler(value)
}
