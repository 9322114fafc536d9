use std::future::Future;

use crate::error::Error;
use crate::events::Subscription;
use crate::types::{AuthChangeEvent, Session, SignUpOutcome, User};

/// Context-bound credential operations.
///
/// Every handle (browser, server, interception) implements this contract over
/// its own storage medium; hooks only ever talk to a `CredentialChannel`, never
/// to the provider.
///
/// # Example
///
/// ```rust,ignore
/// async fn greet(channel: &impl CredentialChannel) -> String {
///     match channel.get_user().await {
///         Ok(user) => format!("Hello, {}", user.email),
///         Err(Error::Unauthenticated) => "Hello, guest".to_string(),
///         Err(e) => format!("Auth unavailable: {e}"),
///     }
/// }
/// ```
pub trait CredentialChannel: Send + Sync + 'static {
    /// Create an account. Malformed input fails with [`Error::Validation`]
    /// without contacting the provider. An active session is committed to
    /// storage and announced as `SignedIn`.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: Option<&str>,
    ) -> impl Future<Output = Result<SignUpOutcome, Error>> + Send;

    /// Ask the provider who the stored credentials belong to.
    ///
    /// Handles with auto-refresh refresh an expiring session first, like
    /// any other read of the session; read-only handles use the stored token
    /// as is. Fails with [`Error::Unauthenticated`] when no valid session is
    /// present.
    fn get_user(&self) -> impl Future<Output = Result<User, Error>> + Send;

    /// Authenticate and commit the session to this context's storage.
    ///
    /// A rejected pair fails with [`Error::InvalidCredentials`] and leaves
    /// storage untouched.
    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Session, Error>> + Send;

    /// Drop the session locally and at the provider. Succeeds when there is
    /// nothing to drop.
    fn sign_out(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Register `callback` for every auth change in this context.
    fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AuthChangeEvent) + Send + Sync + 'static;
}
