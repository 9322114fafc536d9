#![doc = include_str!("../README.md")]

pub mod accessor;
pub mod channel;
pub mod client;
pub mod config;
mod cookies;
pub mod email;
pub mod error;
mod events;
pub mod hooks;
#[cfg(feature = "http")]
pub mod http;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod middleware;
pub mod provider;
pub mod singleton;
pub mod storage;
pub mod types;

// Re-exports for convenient access
#[cfg(feature = "http")]
pub use accessor::{
    BrowserClient, InterceptionClient, ServerClient, create_browser_client,
    create_browser_client_with, create_interception_client, create_interception_client_with,
    create_server_client, create_server_client_with,
};
pub use accessor::{browser_client, interception_client, server_client};
pub use channel::CredentialChannel;
pub use client::{AuthClient, ClientOptions, EXPIRY_MARGIN};
pub use config::{KeyKind, ProviderConfig, default_storage_key};
pub use cookies::CookieOptions;
pub use email::is_plausible_email;
pub use error::Error;
pub use events::Subscription;
#[cfg(feature = "http")]
pub use http::HttpProvider;
pub use provider::IdentityProvider;
pub use singleton::HandleCell;
pub use storage::{InterceptionCookies, MemoryStorage, RequestCookies, SessionStorage};
pub use types::{
    AuthChangeEvent, AuthEventKind, Email, Session, SignUpOutcome, User, UserAttributes, UserId,
};

/// Re-export cookie attribute type for [`CookieOptions::with_same_site`].
pub use axum_extra::extract::cookie::SameSite;
