use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

use super::state::{HookState, Reactive};
use crate::channel::CredentialChannel;
use crate::error::Error;
use crate::types::User;

/// Fetches the current user once per activation.
///
/// One instance serves one mount: [`activate`](Self::activate) looks the user
/// up the first time only, and [`refetch`](Self::refetch) asks again on demand.
pub struct UserQuery<C> {
    channel: Arc<C>,
    state: Reactive<HookState<User>>,
    activated: AtomicBool,
}

impl<C: CredentialChannel> UserQuery<C> {
    #[must_use]
    pub fn new(channel: Arc<C>) -> Self {
        Self {
            channel,
            state: Reactive::new(HookState::Idle),
            activated: AtomicBool::new(false),
        }
    }

    /// Run the lookup on first activation; later calls return the settled
    /// state without contacting the provider again.
    pub async fn activate(&self) -> HookState<User> {
        if !self.activated.swap(true, Ordering::AcqRel) {
            if let Err(e) = self.state.track(self.channel.get_user()).await {
                tracing::debug!(error = %e, "User lookup failed");
            }
        }
        self.state.get()
    }

    /// Look the user up again regardless of earlier activations.
    pub async fn refetch(&self) -> HookState<User> {
        self.activated.store(true, Ordering::Release);
        if let Err(e) = self.state.track(self.channel.get_user()).await {
            tracing::debug!(error = %e, "User lookup failed");
        }
        self.state.get()
    }

    #[must_use]
    pub fn state(&self) -> HookState<User> {
        self.state.get()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<HookState<User>> {
        self.state.watch()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.state.data()
    }

    #[must_use]
    pub fn error(&self) -> Option<Arc<Error>> {
        self.state.error()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    /// Stop publishing state. Permanent: a remounted view needs a new query.
    pub fn deactivate(&self) {
        self.state.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::browser_client;
    use crate::channel::CredentialChannel;
    use crate::memory::InMemoryProvider;

    #[tokio::test]
    async fn settles_with_signed_in_user() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.register("a@x.test", "P@ssw0rd!");
        let client = Arc::new(browser_client(provider.clone(), "k"));
        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();

        let query = UserQuery::new(client);
        assert!(query.state().is_idle());
        let state = query.activate().await;
        assert_eq!(state.data().unwrap().email, "a@x.test");
        assert!(!query.is_loading());

        let before = provider.request_count();
        query.activate().await;
        assert_eq!(provider.request_count(), before);
    }

    #[tokio::test]
    async fn anonymous_context_settles_in_error() {
        let client = Arc::new(browser_client(Arc::new(InMemoryProvider::new()), "k"));
        let query = UserQuery::new(client);
        query.activate().await;
        assert!(matches!(*query.error().unwrap(), Error::Unauthenticated));
        assert!(query.user().is_none());
        assert!(!query.is_loading());
    }

    #[tokio::test]
    async fn expiring_session_is_refreshed_on_activation() {
        let provider = Arc::new(InMemoryProvider::new().with_access_ttl(time::Duration::seconds(5)));
        provider.register("a@x.test", "P@ssw0rd!");
        let client = Arc::new(browser_client(provider.clone(), "k"));
        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();
        provider.expire_access_tokens();

        let query = UserQuery::new(client);
        assert_eq!(query.activate().await.data().unwrap().email, "a@x.test");
        assert!(query.error().is_none());
    }

    #[tokio::test]
    async fn refetch_sees_sign_out() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.register("a@x.test", "P@ssw0rd!");
        let client = Arc::new(browser_client(provider, "k"));
        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();

        let query = UserQuery::new(client.clone());
        assert!(query.activate().await.data().is_some());
        client.sign_out().await.unwrap();

        assert!(query.activate().await.data().is_some());
        let state = query.refetch().await;
        assert!(matches!(state.error().map(|e| &**e), Some(Error::Unauthenticated)));
    }

    #[tokio::test]
    async fn deactivated_query_stays_idle() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.register("a@x.test", "P@ssw0rd!");
        let client = Arc::new(browser_client(provider, "k"));
        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();

        let query = UserQuery::new(client);
        query.deactivate();
        assert!(query.activate().await.is_idle());
    }
}
