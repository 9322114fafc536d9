//! Session refresh middleware for Axum.
//!
//! Mount [`refresh_session`] in front of your routes. It reads the session
//! from the request's cookies, refreshes it when it is about to expire, and
//! writes the rotated cookies back on the same response.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use axum::{Router, middleware::from_fn_with_state, routing::get};
//! use session_bridge::middleware::{AuthUser, SessionLayer, refresh_session};
//!
//! let layer = SessionLayer::from_env()?;
//! let app = Router::new()
//!     .route("/me", get(|AuthUser(user): AuthUser| async move { user.email }))
//!     .layer(from_fn_with_state(layer, refresh_session));
//! ```

mod error;
mod extractor;
mod layer;
mod state;

pub use extractor::AuthUser;
pub use layer::refresh_session;
pub use state::SessionLayer;
