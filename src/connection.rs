//! Per-connection state and the message dispatcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value as Json;

use crate::codec;
use crate::error::ProximateError;
use crate::error_codec;
use crate::handle::{self, Handle};
use crate::nonce;
use crate::pending::PendingTable;
use crate::protocol::ProtocolTable;
use crate::registry;
use crate::remote::Remote;
use crate::transport::{Endpoint, Listener, Transferable};
use crate::value::Value;
use crate::wire::{self, WireMessage};

/// Options accepted by [`wrap`].
#[derive(Default)]
pub struct WrapOptions {
    /// The local object bound as this connection's primary receiver,
    /// addressed by the peer as the empty-string id.
    pub receiver: Option<Arc<dyn Remote>>,

    /// An optional sink observing every raw message, inbound and outbound.
    pub debug: Option<Arc<dyn Fn(Json) + Send + Sync>>,
}

/// Per-wrap connection state: the bound endpoint, this side's primary
/// receiver id (if any), the pending-request table, the handle tracking
/// map, the closed flag, and a per-connection protocol overlay.
pub(crate) struct ConnectionInner {
    endpoint: Arc<dyn Endpoint>,
    primary_id: Option<String>,
    pending: PendingTable,
    handles: Mutex<HashMap<String, u64>>,
    closed: AtomicBool,
    closing: AtomicBool,
    protocols: RwLock<ProtocolTable>,
    debug: Option<Arc<dyn Fn(Json) + Send + Sync>>,
}

impl ConnectionInner {
    pub(crate) fn nonce(&self) -> String {
        nonce::generate()
    }

    pub(crate) fn ensure_open(&self) -> Result<(), ProximateError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ProximateError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn track_mint(&self, id: &str) {
        *self.handles.lock().entry(id.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn track_release(&self, id: &str) {
        let mut handles = self.handles.lock();

        if let Some(count) = handles.get_mut(id) {
            *count -= 1;

            if *count == 0 {
                handles.remove(id);
            }
        }
    }

    pub(crate) fn snapshot_handles(&self) -> HashMap<String, u64> {
        self.handles.lock().clone()
    }

    /// Register a protocol on this connection only, consulted before the
    /// process-wide table.
    pub(crate) fn register_protocol(&self, key: impl Into<String>, protocol: Arc<dyn crate::protocol::Protocol>) {
        self.protocols.write().register(key, protocol);
    }

    fn post(&self, msg: WireMessage, transfer: Vec<Transferable>) -> Result<(), ProximateError> {
        let json = serde_json::to_value(&msg).map_err(|e| ProximateError::Malformed(e.to_string()))?;

        if let Some(sink) = &self.debug {
            sink(json.clone());
        }

        self.endpoint.post(json, transfer)
    }

    pub(crate) async fn round_trip(&self, msg: WireMessage) -> Result<Value, ProximateError> {
        self.ensure_open()?;

        let nonce = msg.id.clone();
        let rx = self.pending.register(nonce);
        self.post(msg, Vec::new())?;

        rx.await.map_err(|_| ProximateError::ConnectionClosed)?
    }

    pub(crate) async fn round_trip_call(&self, path: Vec<String>, args: Vec<Value>) -> Result<Value, ProximateError> {
        self.ensure_open()?;

        let mut wire_args = Vec::with_capacity(args.len());
        let mut transfer = Vec::new();

        {
            let overlay = self.protocols.read();
            let mut register = registry_register();

            for arg in args {
                let (w, t) = codec::serialize(arg, &overlay, &mut register)?;
                wire_args.push(w);
                transfer.extend(t);
            }
        }

        let nonce = self.nonce();
        let rx = self.pending.register(nonce.clone());
        self.post(WireMessage::apply(nonce, path, wire_args), transfer)?;

        rx.await.map_err(|_| ProximateError::ConnectionClosed)?
    }

    /// Assign a named member and return immediately: fire-and-forget. A
    /// rejection at the peer (unknown receiver, the assignment itself
    /// throwing) is logged there, not surfaced here.
    pub(crate) fn fire_and_forget_write(&self, path: Vec<String>, value: Value) -> Result<(), ProximateError> {
        self.ensure_open()?;

        let (wire, transfer) = {
            let overlay = self.protocols.read();
            let mut register = registry_register();
            codec::serialize(value, &overlay, &mut register)?
        };

        let nonce = self.nonce();
        self.post(WireMessage::write(nonce, path, wire), transfer)
    }

    pub(crate) async fn release_primary(&self, id: &str) -> Result<(), ProximateError> {
        self.track_release(id);

        let mut counts = HashMap::new();
        counts.insert(id.to_string(), 1);

        let nonce = self.nonce();
        self.round_trip(WireMessage::release(nonce, vec![id.to_string()], counts))
            .await
            .map(|_| ())
    }

    /// The closing handshake, initiator side.
    pub(crate) async fn close(&self) -> Result<(), ProximateError> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let residual = self.snapshot_handles();
        let nonce = self.nonce();

        let result = self
            .round_trip(WireMessage::close(nonce, vec![String::new()], residual))
            .await;

        if let Ok(value) = &result {
            if let Some(json) = value.as_json() {
                if let Ok(their_residual) = serde_json::from_value::<HashMap<String, u64>>(json.clone()) {
                    for (id, count) in their_residual {
                        registry::dec_ref(&id, count);
                    }
                }
            }
        }

        self.teardown();
        result.map(|_| ())
    }

    /// Shared teardown for both the initiator (after the close round trip
    /// settles) and the responder (after it has replied to a close
    /// request). Clears handle tracking, marks the connection closed,
    /// detaches from the transport, rejects anything still pending, and
    /// releases this side's own primary registration.
    ///
    /// The empty-string wire placeholder is never a real registry key (it
    /// only ever resolves to `primary_id` on the side that owns it), so a
    /// peer reporting `""` in its close/release map can never reach this
    /// entry. Each side is solely responsible for releasing the count its
    /// own `wrap()` call added, exactly once, here.
    fn teardown(&self) {
        self.handles.lock().clear();
        self.closed.store(true, Ordering::SeqCst);
        self.endpoint.remove_listener();
        self.endpoint.close();
        self.pending.reject_all(ProximateError::ConnectionClosed);

        if let Some(id) = &self.primary_id {
            registry::dec_ref(id, 1);
        }
    }
}

fn registry_register() -> impl FnMut(Arc<dyn Remote>) -> String {
    |object| registry::inc_ref(object)
}

/// Bind this connection to `endpoint` and return its primary handle.
///
/// If `options.receiver` is set, it is registered with the process-wide
/// registry and bound as this connection's primary receiver, addressed by
/// the peer with the empty-string id. The returned handle's own path is
/// `[""]`: the primary's id is never transmitted; it is always addressed
/// by the reserved empty string.
pub fn wrap(endpoint: Arc<dyn Endpoint>, options: WrapOptions) -> Handle {
    let primary_id = options.receiver.map(registry::inc_ref);

    let inner = Arc::new(ConnectionInner {
        endpoint: endpoint.clone(),
        primary_id,
        pending: PendingTable::default(),
        handles: Mutex::new(HashMap::new()),
        closed: AtomicBool::new(false),
        closing: AtomicBool::new(false),
        protocols: RwLock::new(ProtocolTable::default()),
        debug: options.debug,
    });

    let dispatch_target = inner.clone();
    let listener: Listener = Arc::new(move |raw: Json| {
        on_message(dispatch_target.clone(), raw);
    });

    endpoint.add_listener(listener);
    endpoint.start();

    Handle::new(inner, vec![String::new()])
}

/// Release a single handle. Equivalent to `handle.release().await`; kept as
/// a free function to match the external interface in spec.md §6.
pub async fn release(handle: &Handle) -> Result<(), ProximateError> {
    handle.release().await
}

/// Initiate the closing handshake on a primary handle. Equivalent to
/// `handle.close().await`.
pub async fn close(handle: &Handle) -> Result<(), ProximateError> {
    handle.close().await
}

fn on_message(inner: Arc<ConnectionInner>, raw: Json) {
    if let Some(sink) = &inner.debug {
        sink(raw.clone());
    }

    let msg: WireMessage = match serde_json::from_value(raw) {
        Ok(m) => m,
        Err(e) => {
            log::warn!("proximate: dropping malformed message: {e}");
            return;
        }
    };

    match wire::classify(&msg) {
        wire::Kind::Request => {
            tokio::spawn(async move { handle_request(inner, msg).await });
        }
        wire::Kind::Response => handle_response(&inner, msg),
        wire::Kind::Unrecognized => {
            log::warn!("proximate: dropping message with neither id+path nor a bare id");
        }
    }
}

fn handle_response(inner: &Arc<ConnectionInner>, msg: WireMessage) {
    let overlay = inner.protocols.read();
    let mut mint = |id: String| handle::mint(inner.clone(), id);

    let outcome = if let Some(error) = &msg.error {
        Err(error_codec::decode(error))
    } else if let Some(result) = &msg.result {
        codec::deserialize(result, &overlay, &mut mint)
    } else {
        Ok(Value::null())
    };

    drop(overlay);
    inner.pending.settle(&msg.id, outcome);
}

enum RequestOutcome {
    Value(Value),
    CloseAck { residual: HashMap<String, u64> },
}

async fn handle_request(inner: Arc<ConnectionInner>, msg: WireMessage) {
    let request_id = msg.id.clone();

    match process_request(&inner, &msg).await {
        Ok(RequestOutcome::Value(value)) => {
            let encoded = {
                let overlay = inner.protocols.read();
                let mut register = registry_register();
                codec::serialize(value, &overlay, &mut register)
            };

            match encoded {
                Ok((wire, transfer)) => {
                    let _ = inner.post(WireMessage::result(request_id, wire), transfer);
                }
                Err(e) => {
                    let _ = inner.post(WireMessage::error(request_id, error_codec::encode(&e)), Vec::new());
                }
            }
        }

        Ok(RequestOutcome::CloseAck { residual }) => {
            let wire = serde_json::to_value(&residual).unwrap_or(Json::Null);
            let _ = inner.post(WireMessage::result(request_id, wire), Vec::new());
            inner.teardown();
        }

        Err(e) => {
            let _ = inner.post(WireMessage::error(request_id, error_codec::encode(&e)), Vec::new());
        }
    }
}

/// Walk a member chain by repeated `get`. Non-terminal steps only; the
/// caller decides what to do with the final step depending on message
/// shape (spec.md §4.6).
fn walk(root: Arc<dyn Remote>, steps: &[String]) -> Result<Value, ProximateError> {
    let mut current = Value::Object(root);

    for step in steps {
        current = match current {
            Value::Object(o) => o.get(step)?,
            _ => return Err(ProximateError::NotObject),
        };
    }

    Ok(current)
}

/// Resolve the callable at the end of `parent`/`method`: if `method` is
/// empty, `parent` itself is invoked (the primary-call case, S1); otherwise
/// `method` is read off `parent` and that is invoked.
fn resolve_callable(parent: Value, method: &[String]) -> Result<Arc<dyn Remote>, ProximateError> {
    if method.is_empty() {
        match parent {
            Value::Object(o) => Ok(o),
            _ => Err(ProximateError::NotCallable),
        }
    } else {
        match parent {
            Value::Object(o) => match o.get(&method[0])? {
                Value::Object(target) => Ok(target),
                _ => Err(ProximateError::NotCallable),
            },
            _ => Err(ProximateError::NotObject),
        }
    }
}

async fn process_request(inner: &Arc<ConnectionInner>, msg: &WireMessage) -> Result<RequestOutcome, ProximateError> {
    let mut path = msg
        .path
        .clone()
        .ok_or_else(|| ProximateError::Malformed("request missing path".into()))?;

    if path.is_empty() {
        return Err(ProximateError::Malformed("request path is empty".into()));
    }

    let head = path.remove(0);

    let receiver_id = if head.is_empty() {
        inner
            .primary_id
            .clone()
            .ok_or_else(|| ProximateError::UnknownReceiver { id: String::new() })?
    } else {
        head
    };

    let receiver = registry::lookup(&receiver_id)?;

    if let Some(args) = &msg.args {
        let (parent_path, method) = path.split_at(path.len().saturating_sub(1));
        let parent = walk(receiver.clone(), parent_path)?;
        let target = resolve_callable(parent, method)?;

        let mut deserialized = Vec::with_capacity(args.len());
        {
            let overlay = inner.protocols.read();
            let mut mint = |id: String| handle::mint(inner.clone(), id);

            for arg in args {
                deserialized.push(codec::deserialize(arg, &overlay, &mut mint)?);
            }
        }

        let result = target.call(deserialized).await?;
        return Ok(RequestOutcome::Value(result));
    }

    if let Some(value) = &msg.value {
        if path.is_empty() {
            return Err(ProximateError::NotObject);
        }

        let (parent_path, prop) = path.split_at(path.len() - 1);
        let parent = walk(receiver, parent_path)?;

        let parent_obj = match parent {
            Value::Object(o) => o,
            _ => return Err(ProximateError::NotObject),
        };

        let deserialized = {
            let overlay = inner.protocols.read();
            let mut mint = |id: String| handle::mint(inner.clone(), id);
            codec::deserialize(value, &overlay, &mut mint)?
        };

        parent_obj.set(&prop[0], deserialized)?;
        return Ok(RequestOutcome::Value(Value::null()));
    }

    if let Some(release_map) = &msg.release {
        for (id, count) in release_map {
            registry::dec_ref(id, *count);
        }

        return Ok(RequestOutcome::Value(Value::null()));
    }

    if let Some(close_map) = &msg.close {
        for (id, count) in close_map {
            registry::dec_ref(id, *count);
        }

        return Ok(RequestOutcome::CloseAck {
            residual: inner.snapshot_handles(),
        });
    }

    // Otherwise, a plain get: the result is the resolved value.
    walk(receiver, &path).map(RequestOutcome::Value)
}
