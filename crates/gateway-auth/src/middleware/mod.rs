//! HTTP middleware.

pub mod auth;

pub use auth::{authorize, AuthMode, AuthState, ClaimsExt};
