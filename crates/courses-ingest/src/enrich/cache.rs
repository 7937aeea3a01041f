//! Run-scoped enrichment cache keyed by course family

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use courses_common::{Enrichment, GroupKey};
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Enrichment>>;

/// Maps each [`GroupKey`] to its enrichment, computing each value at most once.
///
/// The map lock is only held to find or create a key's slot. Computation
/// happens on the slot itself, so a slow lookup for one key never blocks
/// callers for another. Concurrent callers for the same key wait on the slot
/// and share the first result.
#[derive(Debug, Default)]
pub struct DedupCache {
    slots: Mutex<HashMap<GroupKey, Slot>>,
    computations: AtomicUsize,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached enrichment for `key`, running `compute` if this is
    /// the first request for it.
    pub async fn get_or_compute<F, Fut>(&self, key: &GroupKey, compute: F) -> Enrichment
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Enrichment>,
    {
        let slot = self.slot(key);
        let value = slot
            .get_or_init(|| {
                self.computations.fetch_add(1, Ordering::Relaxed);
                compute()
            })
            .await
            .clone();
        value
    }

    /// Peek at a computed value without triggering a computation.
    pub fn get(&self, key: &GroupKey) -> Option<Enrichment> {
        self.lock().get(key).and_then(|slot| slot.get().cloned())
    }

    /// Number of groups with a computed value
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of times a compute function has been started
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    fn slot(&self, key: &GroupKey) -> Slot {
        let mut slots = self.lock();
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }
        let slot = Slot::default();
        slots.insert(key.clone(), Arc::clone(&slot));
        slot
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<GroupKey, Slot>> {
        // No code panics while holding the lock; recover the map if it ever does.
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
