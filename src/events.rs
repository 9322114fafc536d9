use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::types::AuthChangeEvent;

type Listener = Arc<dyn Fn(&AuthChangeEvent) + Send + Sync>;

struct Entry {
    active: Arc<AtomicBool>,
    callback: Listener,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<u64, Entry>>,
}

/// Listener registry behind one handle's `subscribe`.
///
/// Delivery is synchronous and in emission order. Listeners are snapshotted
/// before they run, so a callback may cancel itself or subscribe others
/// without deadlocking.
#[derive(Clone, Default)]
pub(crate) struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub(crate) fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AuthChangeEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        self.registry.listeners.lock().insert(
            id,
            Entry {
                active: active.clone(),
                callback: Arc::new(callback),
            },
        );
        Subscription {
            id,
            active,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub(crate) fn emit(&self, event: &AuthChangeEvent) {
        let snapshot: Vec<(Arc<AtomicBool>, Listener)> = self
            .registry
            .listeners
            .lock()
            .values()
            .map(|e| (e.active.clone(), e.callback.clone()))
            .collect();

        tracing::debug!(event = %event.kind, listeners = snapshot.len(), "Auth state change");

        for (active, callback) in snapshot {
            // cancelled while an earlier listener ran
            if active.load(Ordering::Acquire) {
                callback(event);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.registry.listeners.lock().len()
    }
}

/// Live registration for auth-change notifications.
///
/// [`cancel`](Self::cancel) unregisters the listener the first time and is a
/// no-op afterwards. Dropping the subscription cancels it, so keep it alive
/// for as long as events should arrive.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Unregister the listener. No callback runs after this returns.
    pub fn cancel(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.listeners.lock().remove(&self.id);
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
