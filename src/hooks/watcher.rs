use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::state::Reactive;
use crate::channel::CredentialChannel;
use crate::events::Subscription;
use crate::types::User;

type UserCallback = Arc<dyn Fn(Option<&User>) + Send + Sync>;

struct Shared {
    user: Reactive<Option<User>>,
    callback: Option<UserCallback>,
    // bumped by every event; an initial fetch only lands if nothing arrived meanwhile
    seq: Mutex<u64>,
}

impl Shared {
    fn apply(&self, user: Option<User>) {
        if !self.user.is_active() {
            return;
        }
        if let Some(callback) = &self.callback {
            callback(user.as_ref());
        }
        self.user.set(user);
    }
}

/// Keeps the current user in sync with a channel's auth events.
///
/// The subscription opens before the initial lookup, so no transition can
/// slip between the two. Dropping the watcher cancels the subscription.
pub struct AuthStateWatcher {
    shared: Arc<Shared>,
    subscription: Subscription,
}

impl AuthStateWatcher {
    /// Subscribe to `channel` and fetch the current user once.
    ///
    /// A failed lookup is treated as signed out.
    pub async fn activate<C, F>(channel: &C, callback: Option<F>) -> Self
    where
        C: CredentialChannel,
        F: Fn(Option<&User>) + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            user: Reactive::new(None),
            callback: callback.map(|f| Arc::new(f) as UserCallback),
            seq: Mutex::new(0),
        });

        let listener = shared.clone();
        let subscription = channel.subscribe(move |event| {
            let mut seq = listener.seq.lock();
            *seq += 1;
            listener.apply(event.user().cloned());
        });

        let ticket = *shared.seq.lock();
        let user = match channel.get_user().await {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::debug!(error = %e, "No current user");
                None
            }
        };
        {
            let seq = shared.seq.lock();
            if *seq == ticket {
                shared.apply(user);
            } else {
                tracing::debug!("Initial user lookup superseded by an auth event");
            }
        }

        Self { shared, subscription }
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.shared.user.get()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<User>> {
        self.shared.user.watch()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Stop listening. Safe to call more than once.
    pub fn deactivate(&self) {
        self.shared.user.deactivate();
        self.subscription.cancel();
    }
}

impl Drop for AuthStateWatcher {
    fn drop(&mut self) {
        self.deactivate();
    }
}
