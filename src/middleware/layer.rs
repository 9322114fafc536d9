use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;

use super::extractor::AuthUser;
use super::state::SessionLayer;
use crate::accessor::interception_client;
use crate::error::Error;
use crate::provider::IdentityProvider;

/// Refresh the request's session and forward rotated cookies.
///
/// Use with [`axum::middleware::from_fn_with_state`]. On success the verified
/// [`AuthUser`] and the current [`Session`](crate::Session) are placed in the
/// request extensions. Provider failures are logged and the request proceeds
/// anonymously.
pub async fn refresh_session<P: IdentityProvider>(
    State(layer): State<SessionLayer<P>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> (CookieJar, Response) {
    let client = interception_client(
        layer.provider.clone(),
        &jar,
        layer.storage_key.as_str(),
        layer.cookie_options.clone(),
    );

    match client.get_session().await {
        Ok(Some(session)) => match layer.provider.get_user(&session.access_token).await {
            Ok(user) => {
                tracing::debug!(user_id = %user.id, "Session verified");
                request.extensions_mut().insert(AuthUser(user));
                request.extensions_mut().insert(session);
            }
            Err(Error::Unauthenticated) => {
                tracing::debug!("Stored session rejected by identity provider");
            }
            Err(e) => tracing::warn!(error = %e, "User verification failed"),
        },
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Session refresh failed"),
    }

    // the handle is done; anything it buffered must go out on this response
    let jar = client
        .storage()
        .take_pending()
        .into_iter()
        .fold(jar, |jar, cookie| jar.add(cookie));

    let response = next.run(request).await;
    (jar, response)
}
