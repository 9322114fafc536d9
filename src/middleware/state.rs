use std::sync::Arc;

use crate::cookies::CookieOptions;
use crate::provider::IdentityProvider;

/// Shared state for [`refresh_session`](super::refresh_session).
pub struct SessionLayer<P> {
    pub(super) provider: Arc<P>,
    pub(super) storage_key: String,
    pub(super) cookie_options: CookieOptions,
}

// Manual Clone: avoid derive adding a `P: Clone` bound.
impl<P> Clone for SessionLayer<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            storage_key: self.storage_key.clone(),
            cookie_options: self.cookie_options.clone(),
        }
    }
}

impl<P: IdentityProvider> SessionLayer<P> {
    #[must_use]
    pub fn new(provider: P, storage_key: impl Into<String>) -> Self {
        Self {
            provider: Arc::new(provider),
            storage_key: storage_key.into(),
            cookie_options: CookieOptions::default(),
        }
    }

    #[must_use]
    pub fn with_cookie_options(mut self, options: CookieOptions) -> Self {
        self.cookie_options = options;
        self
    }

    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }
}

#[cfg(feature = "http")]
mod configured {
    use super::SessionLayer;
    use crate::config::{KeyKind, ProviderConfig};
    use crate::error::Error;
    use crate::http::HttpProvider;

    impl SessionLayer<HttpProvider> {
        /// Layer over the hosted provider, configured from
        /// `SUPABASE_URL` and `SUPABASE_ANON_KEY`.
        ///
        /// # Errors
        ///
        /// Returns [`Error::Config`] if either value is missing.
        pub fn from_env() -> Result<Self, Error> {
            Self::from_config(&ProviderConfig::browser_from_env()?)
        }

        /// # Errors
        ///
        /// Returns [`Error::Config`] for a service-role configuration; the
        /// privileged key never backs cookie-bound sessions.
        pub fn from_config(config: &ProviderConfig) -> Result<Self, Error> {
            if config.key_kind() != KeyKind::Anon {
                return Err(Error::Config(
                    "session middleware requires the anonymous key".into(),
                ));
            }
            Ok(Self::new(HttpProvider::new(config), config.storage_key())
                .with_cookie_options(config.cookie_options().clone()))
        }
    }
}
