use std::convert::Infallible;

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;

use crate::error::Error;
use crate::types::User;

/// User verified by [`refresh_session`](super::refresh_session) for this request.
///
/// Returns `401 Unauthorized` if the request carries no valid session.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected(AuthUser(user): AuthUser) -> impl IntoResponse {
///     format!("Hello, {}", user.email)
/// }
///
/// // Optional: accessible to both authenticated and anonymous users
/// async fn public(user: Option<AuthUser>) -> impl IntoResponse {
///     match user {
///         Some(AuthUser(u)) => format!("Hello, {}", u.email),
///         None => "Hello, guest".to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(Error::Unauthenticated)
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for AuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned())
    }
}
