//! The endpoint contract (spec.md §6).
//!
//! The concrete transport is explicitly out of scope (spec.md §1); this is
//! the minimum surface `wrap` needs from whatever carries messages: a
//! browser message port, a worker channel, a raw socket framer, or (for
//! tests) an in-memory duplex pair.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::ProximateError;

/// An opaque, transport-recognized handle a `Protocol` may ask to move
/// rather than copy across the wire (a byte buffer, a message port). What,
/// if anything, a given `Endpoint` does with a `Transferable` is entirely
/// up to that endpoint; the core only threads the list through.
pub struct Transferable(pub Box<dyn Any + Send>);

impl Transferable {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Transferable(Box::new(value))
    }

    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        match self.0.downcast::<T>() {
            Ok(boxed) => Ok(*boxed),
            Err(boxed) => Err(Transferable(boxed)),
        }
    }
}

/// A raw message delivered to a connection's listener.
pub type Listener = Arc<dyn Fn(Json) + Send + Sync>;

/// The bidirectional message transport carrier a connection is `wrap`ped
/// around. Implementations only need register/unregister-listener and post
/// semantics; `start`/`close` are optional hooks with no-op defaults.
pub trait Endpoint: Send + Sync {
    /// Register the connection's message listener. A connection registers
    /// exactly one.
    fn add_listener(&self, listener: Listener);

    /// Unregister whatever listener is currently registered.
    fn remove_listener(&self);

    /// Post a message, with an optional list of transfer-eligible handles
    /// the transport may take ownership of.
    fn post(&self, message: Json, transfer: Vec<Transferable>) -> Result<(), ProximateError>;

    /// Flush a buffered queue, for transports that buffer until a listener
    /// is attached. No-op by default.
    fn start(&self) {}

    /// Release any transport-side resources. No-op by default.
    fn close(&self) {}
}
