use std::future::Future;
use std::sync::Arc;

use crate::error::Error;
use crate::types::{Email, Session, SignUpOutcome, User, UserAttributes};

/// The external identity backend, as this crate consumes it.
///
/// Implementations own transport and status mapping. They must report a
/// rejected password as [`Error::InvalidCredentials`] and a dead or unknown
/// token as [`Error::Unauthenticated`]; everything else the provider refuses
/// is [`Error::Provider`]. Inputs arrive already validated.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Register an account. `redirect_to` is where the confirmation email
    /// should send the user.
    fn sign_up(
        &self,
        email: &Email,
        password: &str,
        redirect_to: Option<&str>,
    ) -> impl Future<Output = Result<SignUpOutcome, Error>> + Send;

    /// Exchange an email/password pair for a session.
    fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> impl Future<Output = Result<Session, Error>> + Send;

    /// Exchange a refresh token for a new session.
    fn refresh(&self, refresh_token: &str) -> impl Future<Output = Result<Session, Error>> + Send;

    /// Fetch the user behind an access token.
    fn get_user(&self, access_token: &str) -> impl Future<Output = Result<User, Error>> + Send;

    /// Apply attribute changes for the user behind an access token and
    /// return the updated user.
    fn update_user(
        &self,
        access_token: &str,
        attributes: &UserAttributes,
    ) -> impl Future<Output = Result<User, Error>> + Send;

    /// Revoke the session behind an access token.
    fn sign_out(&self, access_token: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

impl<P: IdentityProvider> IdentityProvider for Arc<P> {
    fn sign_up(
        &self,
        email: &Email,
        password: &str,
        redirect_to: Option<&str>,
    ) -> impl Future<Output = Result<SignUpOutcome, Error>> + Send {
        (**self).sign_up(email, password, redirect_to)
    }

    fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> impl Future<Output = Result<Session, Error>> + Send {
        (**self).sign_in_with_password(email, password)
    }

    fn refresh(&self, refresh_token: &str) -> impl Future<Output = Result<Session, Error>> + Send {
        (**self).refresh(refresh_token)
    }

    fn get_user(&self, access_token: &str) -> impl Future<Output = Result<User, Error>> + Send {
        (**self).get_user(access_token)
    }

    fn update_user(
        &self,
        access_token: &str,
        attributes: &UserAttributes,
    ) -> impl Future<Output = Result<User, Error>> + Send {
        (**self).update_user(access_token, attributes)
    }

    fn sign_out(&self, access_token: &str) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).sign_out(access_token)
    }
}
