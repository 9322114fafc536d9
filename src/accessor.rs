//! The three ways to bind a provider to an execution context.
//!
//! | constructor            | storage                 | refresh | persist |
//! |------------------------|-------------------------|---------|---------|
//! | [`browser_client`]     | [`MemoryStorage`]       | yes     | yes     |
//! | [`server_client`]      | [`RequestCookies`]      | no      | no      |
//! | [`interception_client`]| [`InterceptionCookies`] | yes     | yes     |
//!
//! Only the interception handle can change what the browser holds, and it
//! must be used before the response is finalized.

use axum_extra::extract::cookie::CookieJar;

use crate::client::{AuthClient, ClientOptions};
use crate::cookies::CookieOptions;
use crate::provider::IdentityProvider;
use crate::storage::{InterceptionCookies, MemoryStorage, RequestCookies};

/// Long-lived handle over process-local storage.
#[must_use]
pub fn browser_client<P: IdentityProvider>(
    provider: P,
    storage_key: impl Into<String>,
) -> AuthClient<P, MemoryStorage> {
    AuthClient::new(provider, MemoryStorage::new(), ClientOptions::new(storage_key))
}

/// Read-only handle over an inbound request's cookies.
///
/// Never refreshes and never writes: a session it obtains lives only in the
/// handle.
#[must_use]
pub fn server_client<P: IdentityProvider>(
    provider: P,
    jar: &CookieJar,
    storage_key: impl Into<String>,
) -> AuthClient<P, RequestCookies> {
    let options = ClientOptions::new(storage_key)
        .with_auto_refresh_token(false)
        .with_persist_session(false);
    AuthClient::new(provider, RequestCookies::from_jar(jar), options)
}

/// Handle for request/response interception.
///
/// Reads the inbound cookies and buffers every session write; drain them with
/// [`InterceptionCookies::take_pending`] and attach them to the response.
#[must_use]
pub fn interception_client<P: IdentityProvider>(
    provider: P,
    jar: &CookieJar,
    storage_key: impl Into<String>,
    cookie_options: CookieOptions,
) -> AuthClient<P, InterceptionCookies> {
    AuthClient::new(
        provider,
        InterceptionCookies::from_jar(jar, cookie_options),
        ClientOptions::new(storage_key),
    )
}

#[cfg(feature = "http")]
pub use self::configured::*;

#[cfg(feature = "http")]
mod configured {
    use axum_extra::extract::cookie::CookieJar;

    use super::{browser_client, interception_client, server_client};
    use crate::client::AuthClient;
    use crate::config::{KeyKind, ProviderConfig};
    use crate::error::Error;
    use crate::http::HttpProvider;
    use crate::storage::{InterceptionCookies, MemoryStorage, RequestCookies};

    pub type BrowserClient = AuthClient<HttpProvider, MemoryStorage>;
    pub type ServerClient = AuthClient<HttpProvider, RequestCookies>;
    pub type InterceptionClient = AuthClient<HttpProvider, InterceptionCookies>;

    fn require(config: &ProviderConfig, kind: KeyKind) -> Result<(), Error> {
        if config.key_kind() == kind {
            return Ok(());
        }
        Err(Error::Config(format!(
            "expected a {kind:?} key, got {:?}",
            config.key_kind()
        )))
    }

    /// Browser handle from `SUPABASE_URL` and `SUPABASE_ANON_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when either value is missing.
    pub fn create_browser_client() -> Result<BrowserClient, Error> {
        create_browser_client_with(&ProviderConfig::browser_from_env()?)
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] unless `config` carries the anonymous key.
    pub fn create_browser_client_with(config: &ProviderConfig) -> Result<BrowserClient, Error> {
        require(config, KeyKind::Anon)?;
        Ok(browser_client(HttpProvider::new(config), config.storage_key()))
    }

    /// Privileged server handle from `SUPABASE_URL` and
    /// `SUPABASE_SERVICE_ROLE_KEY`. Keep it out of anything sent to clients.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when either value is missing.
    pub fn create_server_client(jar: &CookieJar) -> Result<ServerClient, Error> {
        create_server_client_with(&ProviderConfig::service_role_from_env()?, jar)
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] unless `config` carries the service-role key.
    pub fn create_server_client_with(config: &ProviderConfig, jar: &CookieJar) -> Result<ServerClient, Error> {
        require(config, KeyKind::ServiceRole)?;
        Ok(server_client(HttpProvider::new(config), jar, config.storage_key()))
    }

    /// Interception handle from `SUPABASE_URL` and `SUPABASE_ANON_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when either value is missing.
    pub fn create_interception_client(jar: &CookieJar) -> Result<InterceptionClient, Error> {
        create_interception_client_with(&ProviderConfig::browser_from_env()?, jar)
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] unless `config` carries the anonymous key.
    pub fn create_interception_client_with(
        config: &ProviderConfig,
        jar: &CookieJar,
    ) -> Result<InterceptionClient, Error> {
        require(config, KeyKind::Anon)?;
        Ok(interception_client(
            HttpProvider::new(config),
            jar,
            config.storage_key(),
            config.cookie_options().clone(),
        ))
    }
}
