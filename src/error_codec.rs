//! The built-in error protocol: the one reserved shape every implementation
//! must agree on for a failure payload of `{message, stack}`.
//!
//! This lives apart from the pluggable `Protocol` machinery because, in
//! this crate, "the value is an error instance" is not a branch inside the
//! generic value codec: Rust already has a principled error channel via
//! `Result`. The dispatcher encodes/decodes exactly once, at the response
//! boundary (`src/connection.rs`), using the functions here; the payload
//! these functions exchange is the *content* of a `WireMessage`'s `error`
//! field, not a re-wrapped value in its own right. See `DESIGN.md` for the
//! Open Question this resolves.

use serde_json::Value as Json;

use crate::error::ProximateError;

/// Encode an error for the wire as `{message, stack}`. Error identity is not
/// preserved across the boundary; only message and stack survive.
pub fn encode(err: &ProximateError) -> Json {
    let (message, stack) = match err {
        ProximateError::Remote { message, stack } => (message.clone(), stack.clone()),
        other => (other.to_string(), None),
    };

    serde_json::json!({ "message": message, "stack": stack })
}

/// Decode a `{message, stack}` wire value back into a
/// `ProximateError::Remote`, preserving message and stack verbatim.
pub fn decode(error: &Json) -> ProximateError {
    let message = error
        .get("message")
        .and_then(Json::as_str)
        .unwrap_or("remote error")
        .to_string();

    let stack = error
        .get("stack")
        .and_then(Json::as_str)
        .map(str::to_string);

    ProximateError::remote(message, stack)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_message_and_stack() {
        let original = ProximateError::remote("boom", Some("at line 1".to_string()));
        let wire = encode(&original);
        let decoded = decode(&wire);

        assert_eq!(decoded, original);
    }

    #[test]
    fn non_remote_errors_encode_with_their_display_message() {
        let wire = encode(&ProximateError::ConnectionClosed);
        assert_eq!(wire["message"], serde_json::json!("connection closed"));
        assert!(wire["stack"].is_null());
    }
}
