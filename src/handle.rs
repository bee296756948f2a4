//! The handle factory (spec.md §4.5): the core of the interceptor.
//!
//! Rust has no runtime member interception, so per spec.md §9's own design
//! note, the interface is explicit: `get` synthesizes a nested handle
//! without any I/O, `resolve` performs the "await" a JS caller would trigger
//! implicitly, and `set`/`call`/`release`/`close` are ordinary async
//! methods. Because they are methods rather than string-keyed reads, the
//! "unforgeable sentinel" concern from spec.md §4.5 doesn't arise in the
//! first place: a wire-sent property name can never collide with
//! `release`/`close`, since those are never reachable through `get`.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::connection::ConnectionInner;
use crate::error::ProximateError;
use crate::value::Value;
use crate::wire::WireMessage;

/// A local surrogate for a remote object.
///
/// `path`'s head is the target receiver's identifier (the empty string
/// denotes the connection's primary receiver); the tail names a chain of
/// member accesses resolved lazily on use. A handle with `path.len() == 1`
/// is primary on its connection and is tracked in the connection's handle
/// map; longer handles are ephemeral, born only to be immediately resolved
/// or called (spec.md §4.5).
#[derive(Clone)]
pub struct Handle {
    path: Vec<String>,
    connection: Arc<ConnectionInner>,
    released: Arc<AtomicBool>,
}

impl Handle {
    pub(crate) fn new(connection: Arc<ConnectionInner>, path: Vec<String>) -> Self {
        debug_assert!(!path.is_empty(), "a handle's path must not be empty");

        if path.len() == 1 {
            connection.track_mint(&path[0]);
        }

        Handle {
            path,
            connection,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn is_primary(&self) -> bool {
        self.path.len() == 1
    }

    fn ensure_usable(&self) -> Result<(), ProximateError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(ProximateError::ConnectionClosed);
        }

        self.connection.ensure_open()
    }

    /// Descend to a named member. Synthesizes a new handle; posts nothing
    /// (spec.md §4.5: "Does not post a message").
    pub fn get(&self, property: impl Into<String>) -> Handle {
        let mut path = self.path.clone();
        path.push(property.into());
        Handle::new(self.connection.clone(), path)
    }

    /// Resolve this handle to its value: the explicit stand-in for an
    /// implicit `await proxy.a.b`. A primary handle (`path.len() == 1`)
    /// resolves to itself wrapped as `Value::Handle` rather than posting,
    /// matching the thenable short-circuit in spec.md §4.5 (awaiting the
    /// primary must not round-trip). Any other handle posts a get request.
    pub async fn resolve(&self) -> Result<Value, ProximateError> {
        self.ensure_usable()?;

        if self.path.len() == 1 {
            return Ok(Value::Handle(self.clone()));
        }

        self.connection
            .round_trip(WireMessage::get(self.connection.nonce(), self.path.clone()))
            .await
    }

    /// Assign a named member. Returns synchronously once the message is
    /// serialized and posted. Per spec.md §9's Open Question, this crate
    /// follows the dominant behavior and fires the write without awaiting
    /// peer acknowledgement; a peer-side failure (unknown receiver, the
    /// assignment itself throwing) is logged at the peer and otherwise
    /// swallowed, exactly as the spec recommends.
    pub fn set(&self, property: impl Into<String>, value: Value) -> Result<(), ProximateError> {
        self.ensure_usable()?;

        let mut path = self.path.clone();
        path.push(property.into());

        self.connection.fire_and_forget_write(path, value)
    }

    /// Register a protocol on this handle's connection only, consulted
    /// before the process-wide table (spec.md §4.3, "per-connection
    /// overlay").
    pub fn register_protocol(&self, key: impl Into<String>, protocol: Arc<dyn crate::protocol::Protocol>) {
        self.connection.register_protocol(key, protocol);
    }

    /// Invoke this handle as a function.
    pub async fn call(&self, args: Vec<Value>) -> Result<Value, ProximateError> {
        self.ensure_usable()?;

        self.connection
            .round_trip_call(self.path.clone(), args)
            .await
    }

    /// Release this handle. Idempotent: releasing twice is a harmless
    /// no-op the second time (spec.md §5, "Idempotence"). Only meaningful
    /// for a primary (`path.len() == 1`) handle: releasing an ephemeral,
    /// untracked handle is also a no-op, since there was never anything to
    /// track.
    pub async fn release(&self) -> Result<(), ProximateError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if self.path.len() != 1 {
            return Ok(());
        }

        self.connection.release_primary(&self.path[0]).await
    }

    /// Initiate the closing handshake. Only valid on the primary handle
    /// (`path == [""]`); not re-entrant (spec.md §5).
    pub async fn close(&self) -> Result<(), ProximateError> {
        if self.path.len() != 1 || self.path[0] != "" {
            return Err(ProximateError::NotObject);
        }

        self.connection.close().await
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").field("path", &self.path).finish()
    }
}

/// Lets callers write `handle.await` directly, mirroring `await proxy.a.b`
/// in the source material, rather than the more verbose `handle.resolve().await`.
impl IntoFuture for Handle {
    type Output = Result<Value, ProximateError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.resolve().await })
    }
}

/// Helper used by the codec when reconstructing a value whose wire payload
/// names a receiver id: mints a fresh primary handle for `id` on `connection`.
pub(crate) fn mint(connection: Arc<ConnectionInner>, id: String) -> Handle {
    Handle::new(connection, vec![id])
}
