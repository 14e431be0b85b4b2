//! Remote JWKS provider integration tests.
//!
//! A wiremock server stands in for the token issuer's JWKS endpoint.

// Test code is allowed to use expect/unwrap and indexing for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use auth_test_utils::{test_jwk_set, test_public_jwk, TestTokenBuilder};
use gateway_auth::token::{KeyMaterialProvider, RemoteJwksProvider, TokenVerifier, VerifierConfig};
use gateway_auth::AuthError;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JWKS_PATH: &str = "/.well-known/jwks.json";

async fn jwks_server(seeds: &[u8]) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_jwk_set(seeds)))
        .mount(&server)
        .await;
    server
}

fn jwks_url(server: &MockServer) -> String {
    format!("{}{JWKS_PATH}", server.uri())
}

#[tokio::test]
async fn test_token_verifies_against_remote_keys() {
    let server = jwks_server(&[1, 2]).await;
    let provider = RemoteJwksProvider::new(&jwks_url(&server), Duration::from_secs(300)).unwrap();
    let verifier = TokenVerifier::new(VerifierConfig::default(), Arc::new(provider));

    for seed in [1, 2] {
        let token = TestTokenBuilder::new().for_user("u1").sign_ed25519(seed);
        let claims = verifier.verify_token(&token).await.unwrap();
        assert_eq!(claims.subject(), Some("u1"));
    }

    let unknown = TestTokenBuilder::new().sign_ed25519(3);
    assert!(matches!(
        verifier.verify_token(&unknown).await,
        Err(AuthError::InvalidToken(_))
    ));
}

#[tokio::test]
async fn test_keys_are_cached_within_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_jwk_set(&[1])))
        .expect(1)
        .mount(&server)
        .await;

    let provider = RemoteJwksProvider::new(&jwks_url(&server), Duration::from_secs(300)).unwrap();

    for _ in 0..5 {
        let keys = provider.get().await.unwrap();
        assert_eq!(keys.len(), 1);
    }

    server.verify().await;
}

#[tokio::test]
async fn test_expired_cache_is_refreshed() {
    let server = jwks_server(&[1]).await;
    let provider = RemoteJwksProvider::new(&jwks_url(&server), Duration::from_millis(50)).unwrap();

    assert_eq!(provider.get().await.unwrap().len(), 1);

    // Rotate: the endpoint now publishes two keys
    server.reset().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_jwk_set(&[1, 2])))
        .mount(&server)
        .await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    let keys = provider.get().await.unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys.select(Some(&test_public_jwk(2).kid)).is_some());
}

#[tokio::test]
async fn test_unknown_kid_refreshes_once_before_ttl() {
    let server = jwks_server(&[1]).await;
    let provider = RemoteJwksProvider::new(&jwks_url(&server), Duration::from_secs(300)).unwrap();
    let verifier = TokenVerifier::new(VerifierConfig::default(), Arc::new(provider));

    let original = TestTokenBuilder::new().for_user("u1").sign_ed25519(1);
    assert!(verifier.verify_token(&original).await.is_ok());

    // Rotate well inside the TTL
    server.reset().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_jwk_set(&[1, 2])))
        .expect(1)
        .mount(&server)
        .await;

    let rotated = TestTokenBuilder::new().for_user("u2").sign_ed25519(2);
    let claims = verifier.verify_token(&rotated).await.unwrap();
    assert_eq!(claims.subject(), Some("u2"));

    // Another unknown kid right after is rejected without a second fetch
    let unknown = TestTokenBuilder::new().sign_ed25519(3);
    assert!(matches!(
        verifier.verify_token(&unknown).await,
        Err(AuthError::InvalidToken(_))
    ));

    server.verify().await;
}

#[tokio::test]
async fn test_stale_keys_served_when_refresh_fails() {
    let server = jwks_server(&[1]).await;
    let provider = RemoteJwksProvider::new(&jwks_url(&server), Duration::from_millis(50)).unwrap();
    assert_eq!(provider.get().await.unwrap().len(), 1);

    server.reset().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    let keys = provider.get().await.unwrap();
    assert!(keys.select(Some(&test_public_jwk(1).kid)).is_some());
}

#[tokio::test]
async fn test_unreachable_jwks_without_cache_is_key_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let provider = RemoteJwksProvider::new(&jwks_url(&server), Duration::from_secs(300)).unwrap();
    let verifier = TokenVerifier::new(VerifierConfig::default(), Arc::new(provider));
    let token = TestTokenBuilder::new().sign_ed25519(1);

    assert!(matches!(
        verifier.verify_token(&token).await,
        Err(AuthError::KeyUnavailable(_))
    ));
}

#[tokio::test]
async fn test_malformed_document_is_key_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let provider = RemoteJwksProvider::new(&jwks_url(&server), Duration::from_secs(300)).unwrap();

    assert!(matches!(
        provider.get().await,
        Err(AuthError::KeyUnavailable(_))
    ));
}
