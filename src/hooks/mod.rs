//! Reactive session state for interactive front ends.
//!
//! Each hook wraps a [`CredentialChannel`](crate::CredentialChannel) and
//! publishes its progress through a `tokio::sync::watch` channel, so a view
//! layer can re-render on change.

mod actions;
mod navigation;
mod query;
mod state;
mod watcher;

pub use actions::{AUTHENTICATED_LANDING, SignIn, SignOut, SignUp, UNAUTHENTICATED_LANDING};
pub use navigation::Navigator;
pub use query::UserQuery;
pub use state::{HookState, Reactive};
pub use watcher::AuthStateWatcher;
