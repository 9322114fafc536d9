use url::Url;

use crate::cookies::CookieOptions;
use crate::error::Error;

pub const URL_VAR: &str = "SUPABASE_URL";
pub const ANON_KEY_VAR: &str = "SUPABASE_ANON_KEY";
pub const SERVICE_ROLE_KEY_VAR: &str = "SUPABASE_SERVICE_ROLE_KEY";

/// Prefix under which browser-safe values may also be published.
const PUBLIC_PREFIX: &str = "NEXT_PUBLIC_";

/// Which credential the configuration carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Public anonymous key: end-user handles.
    Anon,
    /// Private service-role key: trusted server code only.
    ServiceRole,
}

impl KeyKind {
    fn var(self) -> &'static str {
        match self {
            Self::Anon => ANON_KEY_VAR,
            Self::ServiceRole => SERVICE_ROLE_KEY_VAR,
        }
    }

    fn may_be_public(self) -> bool {
        matches!(self, Self::Anon)
    }
}

/// Identity provider endpoint and credential for one kind of handle.
///
/// Use [`browser_from_env()`](Self::browser_from_env) or
/// [`service_role_from_env()`](Self::service_role_from_env) for
/// convention-based setup, or [`new()`](Self::new) with `with_*` methods.
#[derive(Clone)]
pub struct ProviderConfig {
    url: Url,
    api_key: String,
    key_kind: KeyKind,
    storage_key: String,
    cookie_options: CookieOptions,
}

impl ProviderConfig {
    #[must_use]
    pub fn new(url: Url, api_key: impl Into<String>, key_kind: KeyKind) -> Self {
        Self {
            storage_key: default_storage_key(&url),
            url,
            api_key: api_key.into(),
            key_kind,
            cookie_options: CookieOptions::default(),
        }
    }

    /// Configuration for browser and interception handles.
    ///
    /// # Required env vars
    /// - `SUPABASE_URL` (or `NEXT_PUBLIC_SUPABASE_URL`)
    /// - `SUPABASE_ANON_KEY` (or `NEXT_PUBLIC_SUPABASE_ANON_KEY`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either value is missing or the URL is invalid.
    pub fn browser_from_env() -> Result<Self, Error> {
        Self::from_lookup(KeyKind::Anon, |name| std::env::var(name).ok())
    }

    /// Configuration for the privileged server handle.
    ///
    /// # Required env vars
    /// - `SUPABASE_URL` (or `NEXT_PUBLIC_SUPABASE_URL`)
    /// - `SUPABASE_SERVICE_ROLE_KEY` (never read with the public prefix)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either value is missing or the URL is invalid.
    pub fn service_role_from_env() -> Result<Self, Error> {
        Self::from_lookup(KeyKind::ServiceRole, |name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming every missing variable, or the URL
    /// parse failure.
    pub fn from_lookup(
        key_kind: KeyKind,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Error> {
        let read = |name: &str, may_be_public: bool| {
            lookup(name)
                .or_else(|| {
                    may_be_public
                        .then(|| lookup(&format!("{PUBLIC_PREFIX}{name}")))
                        .flatten()
                })
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let url = read(URL_VAR, true);
        let api_key = read(key_kind.var(), key_kind.may_be_public());

        let (url, api_key) = match (url, api_key) {
            (Some(url), Some(api_key)) => (url, api_key),
            (url, api_key) => {
                let missing: Vec<&str> = [
                    url.is_none().then_some(URL_VAR),
                    api_key.is_none().then_some(key_kind.var()),
                ]
                .into_iter()
                .flatten()
                .collect();
                return Err(Error::Config(format!(
                    "missing identity provider environment variables: {}",
                    missing.join(", ")
                )));
            }
        };

        let url: Url = url
            .parse()
            .map_err(|e| Error::Config(format!("{URL_VAR}: {e}")))?;
        Ok(Self::new(url, api_key, key_kind))
    }

    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    #[must_use]
    pub fn with_cookie_options(mut self, options: CookieOptions) -> Self {
        self.cookie_options = options;
        self
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    #[must_use]
    pub fn key_kind(&self) -> KeyKind {
        self.key_kind
    }

    /// Storage/cookie name the session is persisted under.
    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    #[must_use]
    pub fn cookie_options(&self) -> &CookieOptions {
        &self.cookie_options
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("url", &self.url.as_str())
            .field("api_key", &"<redacted>")
            .field("key_kind", &self.key_kind)
            .field("storage_key", &self.storage_key)
            .finish_non_exhaustive()
    }
}

/// `sb-<first host label>-auth-token`, the provider's cookie naming convention.
#[must_use]
pub fn default_storage_key(url: &Url) -> String {
    let label = url
        .host_str()
        .and_then(|host| host.split('.').next())
        .filter(|label| !label.is_empty())
        .unwrap_or("local");
    format!("sb-{label}-auth-token")
}
