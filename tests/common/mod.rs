//! An in-memory duplex `Endpoint` pair, standing in for the real transport
//! (out of scope per spec.md §1) so the scenarios in `scenarios.rs` can
//! drive two `wrap`ped connections against each other in one process —
//! playing the same role the teacher's `tests/common/mod.rs` plays for its
//! own in-process actor-to-actor wiring.

use std::sync::Arc;

use parking_lot::Mutex;
use proximate::{Endpoint, ProximateError, Transferable};
use serde_json::Value as Json;
use tokio::sync::mpsc;

type Listener = Arc<dyn Fn(Json) + Send + Sync>;

pub struct LocalEndpoint {
    outbox: mpsc::UnboundedSender<Json>,
    listener: Mutex<Option<Listener>>,
}

impl LocalEndpoint {
    fn spawn_pump(self: &Arc<Self>, mut inbox: mpsc::UnboundedReceiver<Json>) {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(msg) = inbox.recv().await {
                let listener = this.listener.lock().clone();
                if let Some(listener) = listener {
                    listener(msg);
                }
            }
        });
    }
}

impl Endpoint for LocalEndpoint {
    fn add_listener(&self, listener: Listener) {
        *self.listener.lock() = Some(listener);
    }

    fn remove_listener(&self) {
        *self.listener.lock() = None;
    }

    fn post(&self, message: Json, _transfer: Vec<Transferable>) -> Result<(), ProximateError> {
        self.outbox
            .send(message)
            .map_err(|e| ProximateError::Transport(e.to_string()))
    }
}

/// Build two endpoints wired to each other: whatever `a` posts, `b`'s
/// listener receives, and vice versa.
pub fn channel_pair() -> (Arc<LocalEndpoint>, Arc<LocalEndpoint>) {
    let (tx_to_b, rx_at_b) = mpsc::unbounded_channel();
    let (tx_to_a, rx_at_a) = mpsc::unbounded_channel();

    let a = Arc::new(LocalEndpoint {
        outbox: tx_to_b,
        listener: Mutex::new(None),
    });
    let b = Arc::new(LocalEndpoint {
        outbox: tx_to_a,
        listener: Mutex::new(None),
    });

    a.spawn_pump(rx_at_a);
    b.spawn_pump(rx_at_b);

    (a, b)
}
