//! The process-wide receiver registry.
//!
//! A bidirectional mapping between local objects exposed to remote peers
//! and their opaque identifiers, with reference counts, shared by every
//! connection in the process, so handing the same object to two peers
//! yields a single entry (spec.md §9, "process-wide registry").

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::ProximateError;
use crate::nonce;
use crate::remote::Remote;

struct Entry {
    object: Arc<dyn Remote>,
    count: u64,
}

#[derive(Default)]
struct Registry {
    by_id: HashMap<String, Entry>,
    by_identity: HashMap<usize, String>,
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(Registry::default()));

/// Identity key for an `Arc<dyn Remote>`: the address of the pointee,
/// dropping the vtable half of the fat pointer. Two `Arc`s cloned from the
/// same allocation (`Arc::ptr_eq`) always yield the same key, which is the
/// only property this registry depends on. There is no ambient weak map in
/// Rust, so entries are only ever removed through the count-reaching-zero
/// path or an explicit `revoke_all`, exactly as spec.md §4.2 allows for
/// languages without weak references.
fn identity_key(object: &Arc<dyn Remote>) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

/// Register `object`, or bump the refcount if it is already registered.
/// Returns the (possibly pre-existing) identifier.
pub fn inc_ref(object: Arc<dyn Remote>) -> String {
    let key = identity_key(&object);
    let mut reg = REGISTRY.lock();

    if let Some(id) = reg.by_identity.get(&key).cloned() {
        reg.by_id.get_mut(&id).expect("inverse map out of sync").count += 1;
        return id;
    }

    let id = nonce::generate();
    reg.by_identity.insert(key, id.clone());
    reg.by_id.insert(id.clone(), Entry { object, count: 1 });
    id
}

/// Decrement `id`'s refcount by `n`; remove the entry (and its inverse)
/// once it reaches zero. Decrementing an unknown id is a silent no-op;
/// this happens routinely on a race between a local release and a peer's
/// close handshake.
pub fn dec_ref(id: &str, n: u64) {
    let mut reg = REGISTRY.lock();

    let Some(entry) = reg.by_id.get_mut(id) else { return };
    entry.count = entry.count.saturating_sub(n);

    if entry.count == 0 {
        let key = identity_key(&entry.object);
        reg.by_id.remove(id);
        reg.by_identity.remove(&key);
    }
}

/// Forcibly remove `object` regardless of outstanding refcount. Any peer
/// still holding a handle to it will subsequently fail lookups with
/// `UnknownReceiver` (invariant 8, "Revoke receiver").
pub fn revoke_all(object: &Arc<dyn Remote>) {
    let key = identity_key(object);
    let mut reg = REGISTRY.lock();

    if let Some(id) = reg.by_identity.remove(&key) {
        reg.by_id.remove(&id);
    }
}

/// Look up a receiver by id.
pub fn lookup(id: &str) -> Result<Arc<dyn Remote>, ProximateError> {
    REGISTRY
        .lock()
        .by_id
        .get(id)
        .map(|e| e.object.clone())
        .ok_or_else(|| ProximateError::UnknownReceiver { id: id.to_string() })
}

/// Current refcount for `id`, or 0 if absent. Used when snapshotting a
/// connection's outstanding handle counts is not what's wanted; this is
/// the registry's own bookkeeping, primarily useful in tests.
#[cfg(test)]
pub(crate) fn ref_count(id: &str) -> u64 {
    REGISTRY.lock().by_id.get(id).map(|e| e.count).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    impl Remote for Dummy {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn registering_same_object_twice_shares_an_id() {
        let obj: Arc<dyn Remote> = Arc::new(Dummy);

        let id1 = inc_ref(obj.clone());
        let id2 = inc_ref(obj.clone());

        assert_eq!(id1, id2);
        assert_eq!(ref_count(&id1), 2);
    }

    #[test]
    fn distinct_objects_get_distinct_ids() {
        let a: Arc<dyn Remote> = Arc::new(Dummy);
        let b: Arc<dyn Remote> = Arc::new(Dummy);

        assert_ne!(inc_ref(a), inc_ref(b));
    }

    #[test]
    fn dec_ref_to_zero_drops_the_entry() {
        let obj: Arc<dyn Remote> = Arc::new(Dummy);
        let id = inc_ref(obj);

        dec_ref(&id, 1);

        assert!(matches!(lookup(&id), Err(ProximateError::UnknownReceiver { .. })));
    }

    #[test]
    fn revoke_all_ignores_outstanding_count() {
        let obj: Arc<dyn Remote> = Arc::new(Dummy);
        let id = inc_ref(obj.clone());
        inc_ref(obj.clone()); // count is now 2

        revoke_all(&obj);

        assert!(matches!(lookup(&id), Err(ProximateError::UnknownReceiver { .. })));
    }

    #[test]
    fn unknown_id_lookup_errors() {
        assert!(matches!(
            lookup("does-not-exist"),
            Err(ProximateError::UnknownReceiver { .. })
        ));
    }
}
