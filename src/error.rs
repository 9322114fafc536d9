/// Errors surfaced by every handle and hook in this crate.
///
/// The variants mirror how a caller is expected to react: fix the deployment
/// (`Config`), fix the input (`Validation`), ask again (`InvalidCredentials`),
/// send the user to sign-in (`Unauthenticated`), or report the outage
/// (`Provider`, `Http`). Nothing in this crate retries automatically.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing or malformed endpoint/credential configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller input rejected before it reached the provider.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider rejected the email/password pair.
    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// No session, or the presented session is no longer valid.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The provider answered with an unexpected status.
    #[error("Provider error during {operation}: {detail}")]
    Provider {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A session could not be encoded for storage.
    #[error("Session storage error: {0}")]
    Storage(String),
}

impl Error {
    pub(crate) fn provider(operation: &'static str, status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::Provider {
            operation,
            status,
            detail: detail.into(),
        }
    }

    /// `true` for transport and provider-side failures.
    #[must_use]
    pub fn is_provider_error(&self) -> bool {
        match self {
            Self::Provider { .. } => true,
            #[cfg(feature = "http")]
            Self::Http(_) => true,
            _ => false,
        }
    }
}
