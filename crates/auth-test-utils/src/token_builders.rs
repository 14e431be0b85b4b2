//! Builder patterns for test tokens
//!
//! Signs arbitrary claims directly with `jsonwebtoken`, bypassing the
//! production issuer, so tests can produce expired, future-dated, foreign
//! or malformed tokens.

use crate::crypto_fixtures::{test_ed25519_pkcs8, test_public_jwk};
use chrono::{Duration, Utc};
use common::jwks::oct_thumbprint;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{Map, Value};

/// Builder for test JWTs
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_audience("content")
///     .expires_in(3600)
///     .sign_ed25519(1);
/// ```
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
    kid: Option<Option<String>>,
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTokenBuilder {
    /// Defaults: `sub` "test-subject", issued now, expiring in one hour,
    /// random `jti`.
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), Value::from("test-subject"));
        claims.insert("iat".to_string(), Value::from(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            Value::from((now + Duration::seconds(3600)).timestamp()),
        );
        claims.insert("jti".to_string(), Value::from(uuid::Uuid::new_v4().to_string()));
        Self { claims, kid: None }
    }

    /// Set the subject.
    pub fn for_user(self, subject: &str) -> Self {
        self.with_claim("sub", subject)
    }

    /// Set the issuer.
    pub fn issued_by(self, issuer: &str) -> Self {
        self.with_claim("iss", issuer)
    }

    /// Set the token id.
    pub fn with_token_id(self, jti: &str) -> Self {
        self.with_claim("jti", jti)
    }

    /// Add an audience. The claim is always encoded as a list.
    pub fn with_audience(mut self, audience: &str) -> Self {
        let mut audiences = match self.claims.remove("aud") {
            Some(Value::Array(list)) => list,
            _ => Vec::new(),
        };
        audiences.push(Value::from(audience));
        self.claims.insert("aud".to_string(), Value::Array(audiences));
        self
    }

    /// Set expiration in seconds from now; negative values produce expired tokens.
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("exp", exp)
    }

    /// Set not-before in seconds from now.
    pub fn not_before_in(self, seconds: i64) -> Self {
        let nbf = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("nbf", nbf)
    }

    /// Set or replace any claim.
    pub fn with_claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.claims.insert(name.to_string(), value.into());
        self
    }

    /// Drop a claim, e.g. `exp`.
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Override the header `kid`; `None` omits it.
    pub fn with_kid(mut self, kid: Option<&str>) -> Self {
        self.kid = Some(kid.map(ToString::to_string));
        self
    }

    /// The claims as they will be signed.
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Sign with the deterministic Ed25519 key for `seed`.
    pub fn sign_ed25519(self, seed: u8) -> String {
        let default_kid = test_public_jwk(seed).kid;
        let key = EncodingKey::from_ed_der(&test_ed25519_pkcs8(seed));
        self.sign(Algorithm::EdDSA, default_kid, &key)
    }

    /// Sign with an HMAC secret.
    pub fn sign_hmac(self, algorithm: Algorithm, secret: &str) -> String {
        let default_kid = oct_thumbprint(secret.as_bytes());
        let key = EncodingKey::from_secret(secret.as_bytes());
        self.sign(algorithm, default_kid, &key)
    }

    fn sign(self, algorithm: Algorithm, default_kid: String, key: &EncodingKey) -> String {
        let mut header = Header::new(algorithm);
        header.typ = Some("JWT".to_string());
        header.kid = match self.kid {
            Some(kid) => kid,
            None => Some(default_kid),
        };

        encode(&header, &Value::Object(self.claims), key).expect("test token must sign")
    }
}
