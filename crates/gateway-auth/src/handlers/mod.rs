//! HTTP handlers served by the gateway itself.

pub mod jwks;

pub use jwks::{handle_get_jwks, JWKS_PATH};
