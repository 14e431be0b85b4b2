//! Public key publication.

use crate::token::TokenIssuer;
use axum::{
    extract::State,
    http::{header::CACHE_CONTROL, HeaderMap, HeaderValue},
    Json,
};
use common::jwks::JwkSet;
use std::sync::Arc;
use tracing::instrument;

/// Route of the JWKS document.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// GET /.well-known/jwks.json
///
/// Publishes the issuer's public key. HMAC issuers publish an empty set.
#[instrument(name = "gateway.jwks.get", skip_all)]
pub async fn handle_get_jwks(State(issuer): State<Arc<TokenIssuer>>) -> (HeaderMap, Json<JwkSet>) {
    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=3600"));

    (headers, Json(issuer.public_key_set()))
}
