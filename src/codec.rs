//! The bidirectional serialization pipeline (spec.md §4.3).

use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::ProximateError;
use crate::protocol::{self, Mint, ProtocolTable, Register, HANDLE_PASSTHROUGH_KEY};
use crate::remote::Remote;
use crate::transport::Transferable;
use crate::value::Value;

/// Serialize a `Value` for the wire, per spec.md §4.3:
///
/// 1. A registered protocol (connection overlay first, then process-wide)
///    that claims the value wraps it as `{type, data}`.
/// 2. An already-remote `Handle` being passed through is tagged with the
///    reserved pass-through key and carries just its own id, with no new
///    registration, since it is already live on whichever side owns that id.
/// 3. A JSON compound is wrapped as `{data}` (the transport is assumed to
///    structurally clone it).
/// 4. A JSON primitive crosses as-is.
///
/// Returns the wire payload plus any transfer-eligible handles a protocol
/// asked to move.
pub fn serialize(
    value: Value,
    overlay: &ProtocolTable,
    register: &mut Register<'_>,
) -> Result<(Json, Vec<Transferable>), ProximateError> {
    match value {
        Value::Handle(handle) => {
            let id = handle.path()[0].clone();
            Ok((
                serde_json::json!({ "type": HANDLE_PASSTHROUGH_KEY, "data": { "id": id } }),
                Vec::new(),
            ))
        }

        Value::Object(object) => {
            let found = overlay
                .find_handler(&object)
                .or_else(|| protocol::global_find_handler(&object));

            let Some((key, handler)) = found else {
                return Err(ProximateError::NoProtocolForValue);
            };

            let (data, transfer) = handler.serialize(object, register);
            Ok((serde_json::json!({ "type": key, "data": data }), transfer))
        }

        Value::Json(json) => match json {
            // A compound is wrapped under the reserved "data" key so it can
            // never be mistaken for a protocol envelope (`{type, data}`),
            // the built-in error shape (`{error}`), or a bare wrapped value
            // coincidentally sharing one of those keys (spec.md §4.3 step
            // 3). A primitive can't collide with any of those shapes, since
            // none of them are ever itself a JSON object, so it crosses as-is.
            Json::Object(_) | Json::Array(_) => Ok((serde_json::json!({ "data": json }), Vec::new())),
            primitive => Ok((primitive, Vec::new())),
        },
    }
}

/// Deserialize a wire payload into a `Value`, per spec.md §4.3.
pub fn deserialize(wire: &Json, overlay: &ProtocolTable, mint: &mut Mint<'_>) -> Result<Value, ProximateError> {
    if let Some(obj) = wire.as_object() {
        if let Some(key) = obj.get("type").and_then(Json::as_str) {
            let data = obj.get("data").cloned().unwrap_or(Json::Null);

            if key == HANDLE_PASSTHROUGH_KEY {
                return protocol::deserialize_by_handle(data, mint);
            }

            let handler = overlay
                .get(key)
                .or_else(|| protocol::global_get(key))
                .ok_or_else(|| ProximateError::UnknownProtocol { key: key.to_string() })?;

            return handler.deserialize(data, mint);
        }

        if let Some(error) = obj.get("error") {
            return Err(crate::error_codec::decode(error));
        }

        if let Some(data) = obj.get("data") {
            return Ok(Value::Json(data.clone()));
        }
    }

    Ok(Value::Json(wire.clone()))
}

/// Bind `register` directly to the process-wide registry's `inc_ref`, the
/// common case when a connection has no reason to intercept registration.
pub fn registry_register() -> impl FnMut(Arc<dyn Remote>) -> String {
    |object| crate::registry::inc_ref(object)
}
