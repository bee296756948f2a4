//! Per-connection pending-request table (spec.md §4.4).

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::ProximateError;
use crate::value::Value;

type Settlement = oneshot::Sender<Result<Value, ProximateError>>;

#[derive(Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<String, Settlement>>,
}

impl PendingTable {
    /// Register a nonce, returning the receiving half of its settlement
    /// channel. Lives exactly one round trip: from here until `settle` or
    /// `reject_all` consumes it.
    pub fn register(&self, nonce: String) -> oneshot::Receiver<Result<Value, ProximateError>> {
        let (tx, rx) = oneshot::channel();
        self.entries.lock().insert(nonce, tx);
        rx
    }

    /// Settle `nonce` with its result, if still pending. A response for an
    /// unknown nonce (already settled, or never ours: a cancelled or
    /// duplicated exchange) is logged and discarded, per spec.md §4.4.
    pub fn settle(&self, nonce: &str, outcome: Result<Value, ProximateError>) {
        let tx = self.entries.lock().remove(nonce);

        match tx {
            Some(tx) => {
                // The receiver may already be gone if the caller stopped
                // awaiting (e.g. the task was cancelled); that's not our
                // problem to report.
                let _ = tx.send(outcome);
            }
            None => {
                log::warn!("proximate: response for unknown or already-settled nonce {nonce}");
            }
        }
    }

    /// Reject every still-pending entry, e.g. on connection close.
    pub fn reject_all(&self, err: ProximateError) {
        let mut entries = self.entries.lock();

        for (_, tx) in entries.drain() {
            let _ = tx.send(Err(err.clone()));
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settle_delivers_to_the_registered_receiver() {
        let table = PendingTable::default();
        let rx = table.register("n1".into());

        table.settle("n1", Ok(Value::Json(serde_json::json!(7))));

        let outcome = rx.await.unwrap();
        assert_eq!(outcome.unwrap().as_json(), Some(&serde_json::json!(7)));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn settling_an_unknown_nonce_is_a_harmless_no_op() {
        let table = PendingTable::default();
        table.settle("ghost", Ok(Value::null()));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn reject_all_settles_every_outstanding_entry_with_the_same_error() {
        let table = PendingTable::default();
        let rx1 = table.register("n1".into());
        let rx2 = table.register("n2".into());

        table.reject_all(ProximateError::ConnectionClosed);

        assert!(matches!(rx1.await.unwrap(), Err(ProximateError::ConnectionClosed)));
        assert!(matches!(rx2.await.unwrap(), Err(ProximateError::ConnectionClosed)));
        assert_eq!(table.len(), 0);
    }
}
