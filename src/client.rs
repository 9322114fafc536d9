use parking_lot::Mutex;
use time::Duration;

use crate::channel::CredentialChannel;
use crate::error::Error;
use crate::events::{EventBus, Subscription};
use crate::provider::IdentityProvider;
use crate::storage::SessionStorage;
use crate::types::{
    AuthChangeEvent, AuthEventKind, Email, Session, SignUpOutcome, User, UserAttributes,
    validate_password,
};

/// Refresh once fewer than this many seconds of access-token life remain.
pub const EXPIRY_MARGIN: Duration = Duration::seconds(10);

/// Per-handle behaviour switches.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientOptions {
    pub(crate) storage_key: String,
    pub(crate) auto_refresh_token: bool,
    pub(crate) persist_session: bool,
}

impl ClientOptions {
    /// Refresh and persistence enabled.
    #[must_use]
    pub fn new(storage_key: impl Into<String>) -> Self {
        Self {
            storage_key: storage_key.into(),
            auto_refresh_token: true,
            persist_session: true,
        }
    }

    #[must_use]
    pub fn with_auto_refresh_token(mut self, enabled: bool) -> Self {
        self.auto_refresh_token = enabled;
        self
    }

    /// When off, sessions obtained through this handle live only in the
    /// handle and are never written to its storage.
    #[must_use]
    pub fn with_persist_session(mut self, enabled: bool) -> Self {
        self.persist_session = enabled;
        self
    }

    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    #[must_use]
    pub fn auto_refresh_token(&self) -> bool {
        self.auto_refresh_token
    }

    #[must_use]
    pub fn persist_session(&self) -> bool {
        self.persist_session
    }
}

/// Session held by a non-persisting handle.
#[derive(Debug, Default)]
enum Local {
    #[default]
    Unset,
    Held(Session),
    Cleared,
}

/// A provider bound to one storage medium: the concrete handle type behind
/// every construction strategy.
pub struct AuthClient<P, S> {
    provider: P,
    storage: S,
    options: ClientOptions,
    events: EventBus,
    local: Mutex<Local>,
    // one refresh in flight per handle; the provider rotates refresh tokens
    refresh_lock: tokio::sync::Mutex<()>,
}

impl<P: IdentityProvider, S: SessionStorage> AuthClient<P, S> {
    #[must_use]
    pub fn new(provider: P, storage: S, options: ClientOptions) -> Self {
        Self {
            provider,
            storage,
            options,
            events: EventBus::default(),
            local: Mutex::new(Local::Unset),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Current session, refreshed first when it is about to expire.
    ///
    /// Returns `Ok(None)` when there is no session or the provider rejected
    /// the refresh token (storage is cleared and `SignedOut` emitted).
    /// Transport and provider failures are returned as errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provider`] or [`Error::Http`](Error) when the refresh
    /// call fails for reasons other than a dead refresh token.
    pub async fn get_session(&self) -> Result<Option<Session>, Error> {
        let Some(session) = self.load_session() else {
            return Ok(None);
        };
        if !session.expires_within(EXPIRY_MARGIN) {
            return Ok(Some(session));
        }
        if !self.options.auto_refresh_token {
            return Ok((!session.is_expired()).then_some(session));
        }
        match self.refresh_with(&session.refresh_token).await {
            Ok(session) => Ok(Some(session)),
            Err(Error::Unauthenticated) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Refresh the stored session unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthenticated`] when there is no session or the
    /// refresh token was rejected, or the provider failure otherwise.
    pub async fn refresh_session(&self) -> Result<Session, Error> {
        let session = self.load_session().ok_or(Error::Unauthenticated)?;
        self.refresh_with(&session.refresh_token).await
    }

    /// Change email, password, or metadata of the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for malformed attributes,
    /// [`Error::Unauthenticated`] without a session, or the provider failure.
    pub async fn update_user(&self, attributes: &UserAttributes) -> Result<User, Error> {
        attributes.validate()?;
        let mut session = self.get_session().await?.ok_or(Error::Unauthenticated)?;
        let user = self
            .provider
            .update_user(&session.access_token, attributes)
            .await?;
        session.user = user.clone();
        self.save_session(&session)?;
        tracing::info!(user_id = %user.id, "User updated");
        self.emit(AuthEventKind::UserUpdated, Some(session));
        Ok(user)
    }

    /// Refresh under the handle's refresh lock.
    ///
    /// A caller that waited on the lock finds the token already rotated and
    /// takes the stored session instead of spending the old token again.
    async fn refresh_with(&self, refresh_token: &str) -> Result<Session, Error> {
        let _guard = self.refresh_lock.lock().await;
        match self.load_session() {
            None => return Err(Error::Unauthenticated),
            Some(current) if current.refresh_token != refresh_token => {
                tracing::debug!(user_id = %current.user.id, "Session already refreshed");
                return Ok(current);
            }
            Some(_) => {}
        }

        match self.provider.refresh(refresh_token).await {
            Ok(session) => {
                self.save_session(&session)?;
                tracing::debug!(user_id = %session.user.id, "Session refreshed");
                self.emit(AuthEventKind::TokenRefreshed, Some(session.clone()));
                Ok(session)
            }
            Err(Error::Unauthenticated) => {
                // a sign-in may have replaced the session meanwhile
                if self
                    .load_session()
                    .is_some_and(|s| s.refresh_token == refresh_token)
                {
                    tracing::warn!("Refresh token rejected; dropping session");
                    self.clear_session();
                    self.emit(AuthEventKind::SignedOut, None);
                }
                Err(Error::Unauthenticated)
            }
            Err(e) => Err(e),
        }
    }

    /// Stored session as a provider call should see it: refreshed first on
    /// handles with auto-refresh, as stored otherwise.
    async fn usable_session(&self) -> Result<Option<Session>, Error> {
        if self.options.auto_refresh_token {
            self.get_session().await
        } else {
            Ok(self.load_session())
        }
    }

    fn load_session(&self) -> Option<Session> {
        if !self.options.persist_session {
            match &*self.local.lock() {
                Local::Held(session) => return Some(session.clone()),
                Local::Cleared => return None,
                Local::Unset => {}
            }
        }
        let raw = self.storage.get(&self.options.storage_key)?;
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable stored session");
                self.storage.remove(&self.options.storage_key);
                None
            }
        }
    }

    fn save_session(&self, session: &Session) -> Result<(), Error> {
        if !self.options.persist_session {
            *self.local.lock() = Local::Held(session.clone());
            return Ok(());
        }
        let raw = serde_json::to_string(session).map_err(|e| Error::Storage(e.to_string()))?;
        self.storage.set(&self.options.storage_key, &raw);
        Ok(())
    }

    fn clear_session(&self) {
        if !self.options.persist_session {
            *self.local.lock() = Local::Cleared;
            return;
        }
        self.storage.remove(&self.options.storage_key);
    }

    fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        self.events.emit(&AuthChangeEvent::new(kind, session));
    }
}

impl<P: IdentityProvider, S: SessionStorage> CredentialChannel for AuthClient<P, S> {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: Option<&str>,
    ) -> Result<SignUpOutcome, Error> {
        let email: Email = email.parse()?;
        validate_password(password)?;

        let outcome = self.provider.sign_up(&email, password, redirect_to).await?;
        match &outcome {
            SignUpOutcome::Active(session) => {
                self.save_session(session)?;
                tracing::info!(user_id = %session.user.id, "Sign-up started a session");
                self.emit(AuthEventKind::SignedIn, Some(session.clone()));
            }
            SignUpOutcome::PendingConfirmation(user) => {
                tracing::info!(user_id = %user.id, "Sign-up awaiting email confirmation");
            }
        }
        Ok(outcome)
    }

    async fn get_user(&self) -> Result<User, Error> {
        let session = self.usable_session().await?.ok_or(Error::Unauthenticated)?;
        self.provider.get_user(&session.access_token).await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, Error> {
        let email: Email = email.parse()?;
        validate_password(password)?;

        let session = self
            .provider
            .sign_in_with_password(&email, password)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Sign-in failed"))?;
        self.save_session(&session)?;
        tracing::info!(user_id = %session.user.id, "Signed in");
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), Error> {
        // an unreachable refresh must not block signing out
        let session = self.usable_session().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Refresh before sign-out failed");
            self.load_session()
        });
        let Some(session) = session else {
            tracing::debug!("Sign-out without a session");
            return Ok(());
        };

        match self.provider.sign_out(&session.access_token).await {
            // already revoked at the provider
            Ok(()) | Err(Error::Unauthenticated) => {}
            Err(e) => {
                tracing::error!(error = %e, "Sign-out failed at provider");
                return Err(e);
            }
        }

        self.clear_session();
        tracing::info!(user_id = %session.user.id, "Signed out");
        self.emit(AuthEventKind::SignedOut, None);
        Ok(())
    }

    fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AuthChangeEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::memory::InMemoryProvider;
    use crate::storage::MemoryStorage;

    const KEY: &str = "sb-x-auth-token";

    fn client(provider: Arc<InMemoryProvider>) -> AuthClient<Arc<InMemoryProvider>, MemoryStorage> {
        AuthClient::new(provider, MemoryStorage::new(), ClientOptions::new(KEY))
    }

    fn record<P: IdentityProvider>(client: &AuthClient<P, MemoryStorage>) -> (Subscription, Arc<Mutex<Vec<AuthChangeEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = client.subscribe(move |e| sink.lock().push(e.clone()));
        (sub, seen)
    }

    #[tokio::test]
    async fn sign_up_then_sign_in_yields_same_user() {
        let provider = Arc::new(InMemoryProvider::new());
        let client = client(provider);

        let outcome = client.sign_up("a@x.test", "P@ssw0rd!", None).await.unwrap();
        assert_eq!(outcome.user().email, "a@x.test");

        client.sign_out().await.unwrap();
        let session = client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();
        assert_eq!(session.user.id, outcome.user().id);
        assert_eq!(client.get_user().await.unwrap().id, outcome.user().id);
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials_and_persists_nothing() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.register("a@x.test", "P@ssw0rd!");
        let client = client(provider);

        let err = client.sign_in_with_password("a@x.test", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
        assert!(client.storage().get(KEY).is_none());
        assert!(matches!(client.get_user().await, Err(Error::Unauthenticated)));
    }

    #[tokio::test]
    async fn malformed_input_never_reaches_provider() {
        let provider = Arc::new(InMemoryProvider::new());
        let client = client(provider.clone());

        assert!(matches!(client.sign_up("nope", "x", None).await, Err(Error::Validation(_))));
        assert!(matches!(client.sign_up("a@x.test", "", None).await, Err(Error::Validation(_))));
        assert!(matches!(
            client.sign_in_with_password("a@x.test", "").await,
            Err(Error::Validation(_))
        ));
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn sign_out_is_idempotent() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.register("a@x.test", "P@ssw0rd!");
        let client = client(provider);
        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();

        client.sign_out().await.unwrap();
        assert!(matches!(client.get_user().await, Err(Error::Unauthenticated)));
        client.sign_out().await.unwrap();
        assert!(matches!(client.get_user().await, Err(Error::Unauthenticated)));
    }

    #[tokio::test]
    async fn sign_out_keeps_session_when_provider_is_down() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.register("a@x.test", "P@ssw0rd!");
        let client = client(provider.clone());
        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();

        provider.set_unavailable(true);
        let err = client.sign_out().await.unwrap_err();
        assert!(err.is_provider_error());
        assert!(client.storage().get(KEY).is_some());
    }

    #[tokio::test]
    async fn subscription_sees_each_transition_once() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.register("a@x.test", "P@ssw0rd!");
        let client = client(provider);
        let (_sub, seen) = record(&client);

        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();
        client.refresh_session().await.unwrap();
        client.sign_out().await.unwrap();

        let kinds: Vec<AuthEventKind> = seen.lock().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AuthEventKind::SignedIn,
                AuthEventKind::TokenRefreshed,
                AuthEventKind::SignedOut
            ]
        );
        assert_eq!(seen.lock()[0].user().unwrap().email, "a@x.test");
        assert!(seen.lock()[2].user().is_none());
    }

    #[tokio::test]
    async fn cancelled_subscription_sees_nothing() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.register("a@x.test", "P@ssw0rd!");
        let client = client(provider);
        let (sub, seen) = record(&client);

        sub.cancel();
        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn fresh_session_is_returned_without_refresh() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.register("a@x.test", "P@ssw0rd!");
        let client = client(provider);
        let signed_in = client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();

        let current = client.get_session().await.unwrap().unwrap();
        assert_eq!(current.access_token, signed_in.access_token);
    }

    #[tokio::test]
    async fn rejected_refresh_token_signs_out() {
        let provider = Arc::new(InMemoryProvider::new().with_access_ttl(Duration::seconds(5)));
        provider.register("a@x.test", "P@ssw0rd!");
        let client = client(provider.clone());
        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();
        let (_sub, seen) = record(&client);

        provider.revoke_refresh_tokens();
        assert_eq!(client.get_session().await.unwrap(), None);
        assert!(client.storage().get(KEY).is_none());
        assert_eq!(seen.lock()[0].kind, AuthEventKind::SignedOut);
    }

    #[tokio::test]
    async fn refresh_outage_is_surfaced_not_swallowed() {
        let provider = Arc::new(InMemoryProvider::new().with_access_ttl(Duration::seconds(5)));
        provider.register("a@x.test", "P@ssw0rd!");
        let client = client(provider.clone());
        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();

        provider.set_unavailable(true);
        assert!(client.get_session().await.unwrap_err().is_provider_error());
        assert!(client.storage().get(KEY).is_some());
    }

    #[tokio::test]
    async fn pending_confirmation_stores_no_session() {
        let provider = Arc::new(InMemoryProvider::new().with_email_confirmation(true));
        let client = client(provider);
        let (_sub, seen) = record(&client);

        let outcome = client.sign_up("a@x.test", "P@ssw0rd!", Some("https://x.test/welcome")).await.unwrap();
        assert!(matches!(outcome, SignUpOutcome::PendingConfirmation(_)));
        assert!(client.storage().get(KEY).is_none());
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn update_user_replaces_stored_user() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.register("a@x.test", "P@ssw0rd!");
        let client = client(provider);
        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();
        let (_sub, seen) = record(&client);

        let mut data = serde_json::Map::new();
        data.insert("name".into(), "A".into());
        let user = client
            .update_user(&UserAttributes {
                data: Some(data),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(user.user_metadata["name"], "A");
        let stored = client.get_session().await.unwrap().unwrap();
        assert_eq!(stored.user, user);
        assert_eq!(seen.lock()[0].kind, AuthEventKind::UserUpdated);
    }

    #[tokio::test]
    async fn non_persisting_handle_keeps_session_in_memory() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.register("a@x.test", "P@ssw0rd!");
        let client = AuthClient::new(
            provider,
            MemoryStorage::new(),
            ClientOptions::new(KEY).with_persist_session(false).with_auto_refresh_token(false),
        );

        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();
        assert!(client.storage().get(KEY).is_none());
        assert_eq!(client.get_user().await.unwrap().email, "a@x.test");

        client.sign_out().await.unwrap();
        assert!(matches!(client.get_user().await, Err(Error::Unauthenticated)));
    }

    #[tokio::test]
    async fn explicit_refresh_rotates_tokens() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.register("a@x.test", "P@ssw0rd!");
        let client = client(provider);
        assert!(matches!(client.refresh_session().await, Err(Error::Unauthenticated)));

        let first = client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();
        let second = client.refresh_session().await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);
        assert_eq!(client.get_session().await.unwrap().unwrap().access_token, second.access_token);
    }

    /// Yields before every refresh so concurrent callers interleave.
    struct YieldingProvider(Arc<InMemoryProvider>);

    impl IdentityProvider for YieldingProvider {
        async fn sign_up(&self, email: &Email, password: &str, redirect_to: Option<&str>) -> Result<SignUpOutcome, Error> {
            self.0.sign_up(email, password, redirect_to).await
        }

        async fn sign_in_with_password(&self, email: &Email, password: &str) -> Result<Session, Error> {
            self.0.sign_in_with_password(email, password).await
        }

        async fn refresh(&self, refresh_token: &str) -> Result<Session, Error> {
            tokio::task::yield_now().await;
            self.0.refresh(refresh_token).await
        }

        async fn get_user(&self, access_token: &str) -> Result<User, Error> {
            self.0.get_user(access_token).await
        }

        async fn update_user(&self, access_token: &str, attributes: &UserAttributes) -> Result<User, Error> {
            self.0.update_user(access_token, attributes).await
        }

        async fn sign_out(&self, access_token: &str) -> Result<(), Error> {
            self.0.sign_out(access_token).await
        }
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_rotation() {
        let provider = Arc::new(InMemoryProvider::new().with_access_ttl(Duration::seconds(5)));
        provider.register("a@x.test", "P@ssw0rd!");
        let client = AuthClient::new(
            YieldingProvider(provider.clone()),
            MemoryStorage::new(),
            ClientOptions::new(KEY),
        );
        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();
        let (_sub, seen) = record(&client);
        let before = provider.request_count();

        let (a, b) = tokio::join!(client.get_session(), client.get_session());
        let (a, b) = (a.unwrap().unwrap(), b.unwrap().unwrap());

        assert_eq!(a.refresh_token, b.refresh_token);
        assert_eq!(provider.request_count(), before + 1);
        let kinds: Vec<AuthEventKind> = seen.lock().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![AuthEventKind::TokenRefreshed]);
        assert!(client.storage().get(KEY).is_some());
        assert_eq!(client.get_user().await.unwrap().email, "a@x.test");
    }

    #[tokio::test]
    async fn get_user_refreshes_an_expiring_session() {
        let provider = Arc::new(InMemoryProvider::new().with_access_ttl(Duration::seconds(5)));
        provider.register("a@x.test", "P@ssw0rd!");
        let client = client(provider.clone());
        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();

        provider.expire_access_tokens();
        assert_eq!(client.get_user().await.unwrap().email, "a@x.test");
    }

    #[tokio::test]
    async fn get_user_without_auto_refresh_uses_stored_token() {
        let provider = Arc::new(InMemoryProvider::new().with_access_ttl(Duration::seconds(5)));
        provider.register("a@x.test", "P@ssw0rd!");
        let client = AuthClient::new(
            provider.clone(),
            MemoryStorage::new(),
            ClientOptions::new(KEY).with_auto_refresh_token(false),
        );
        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();

        provider.expire_access_tokens();
        assert!(matches!(client.get_user().await, Err(Error::Unauthenticated)));
    }

    #[tokio::test]
    async fn sign_out_with_dead_refresh_token_signs_out_once() {
        let provider = Arc::new(InMemoryProvider::new().with_access_ttl(Duration::seconds(5)));
        provider.register("a@x.test", "P@ssw0rd!");
        let client = client(provider.clone());
        client.sign_in_with_password("a@x.test", "P@ssw0rd!").await.unwrap();
        let (_sub, seen) = record(&client);

        provider.revoke_refresh_tokens();
        client.sign_out().await.unwrap();
        assert!(client.storage().get(KEY).is_none());
        let kinds: Vec<AuthEventKind> = seen.lock().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![AuthEventKind::SignedOut]);
    }

    #[tokio::test]
    async fn corrupt_stored_session_is_discarded() {
        let client = client(Arc::new(InMemoryProvider::new()));
        client.storage().set(KEY, "{not json");
        assert_eq!(client.get_session().await.unwrap(), None);
        assert!(client.storage().get(KEY).is_none());
    }
}
