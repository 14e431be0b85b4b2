//! Token verification.
//!
//! Steps, in order:
//! 1. Size and format check, `kid` read from the unverified header
//! 2. Key selection and signature verification (the key's algorithm only)
//! 3. Claims decoded into the typed [`Claims`]
//! 4. Exact issuer, subject and token-id matches when configured
//! 5. Every configured audience present in the token
//! 6. `nbf`/`exp` against the leeway window
//!
//! Any failure is reported as the same `InvalidToken`; the reason is only
//! logged at debug level.

use crate::errors::AuthError;
use crate::observability::metrics;
use crate::token::claims::Claims;
use crate::token::keys::{KeyMaterialProvider, VerificationKey};
use crate::token::lookup::TokenLookup;
use axum::http::{HeaderMap, Uri};
use common::jwt::{self, DEFAULT_LEEWAY};
use jsonwebtoken::Validation;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Verification settings. Empty/`None` checks are skipped.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Where tokens are read from.
    pub lookup: TokenLookup,

    /// Symmetric tolerance for `nbf` and `exp`.
    pub leeway: Duration,

    /// Required `iss`.
    pub issuer: Option<String>,

    /// Required `sub`.
    pub subject: Option<String>,

    /// Required `jti`.
    pub token_id: Option<String>,

    /// Audiences that must all appear in the token's `aud`.
    pub audiences: Vec<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            lookup: TokenLookup::default(),
            leeway: DEFAULT_LEEWAY,
            issuer: None,
            subject: None,
            token_id: None,
            audiences: Vec::new(),
        }
    }
}

/// Verifies bearer tokens against the current key material.
pub struct TokenVerifier {
    config: VerifierConfig,
    keys: Arc<dyn KeyMaterialProvider>,
}

impl TokenVerifier {
    pub fn new(config: VerifierConfig, keys: Arc<dyn KeyMaterialProvider>) -> Self {
        Self { config, keys }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Extract and verify the token of a request.
    ///
    /// # Errors
    ///
    /// `NoToken` when the lookup location is empty, `InvalidToken` for any
    /// failed check, `KeyUnavailable` when no keys can be obtained.
    pub async fn verify_request(&self, headers: &HeaderMap, uri: &Uri) -> Result<Claims, AuthError> {
        let token = self.config.lookup.extract(headers, uri)?;
        self.verify_token(&token).await
    }

    /// Verify a raw token at the current time.
    ///
    /// # Errors
    ///
    /// See [`TokenVerifier::verify_request`].
    pub async fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_token_at(token, chrono::Utc::now().timestamp())
            .await
    }

    /// Verify a raw token as of `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// See [`TokenVerifier::verify_request`].
    #[instrument(skip_all, name = "gateway.auth.verify")]
    pub async fn verify_token_at(&self, token: &str, now: i64) -> Result<Claims, AuthError> {
        let result = self.verify_inner(token, now).await;
        metrics::record_token_verification(match &result {
            Ok(_) => "valid",
            Err(AuthError::KeyUnavailable(_)) => "key_unavailable",
            Err(_) => "invalid",
        });
        result
    }

    async fn verify_inner(&self, token: &str, now: i64) -> Result<Claims, AuthError> {
        let header = jwt::inspect_header(token)?;

        let keys = match header.kid.as_deref() {
            Some(kid) => self.keys.get_for_key(kid).await?,
            None => self.keys.get().await?,
        };
        let key = keys.select(header.kid.as_deref()).ok_or_else(|| {
            tracing::debug!(
                target: "gateway.auth.verifier",
                kid = ?header.kid,
                "No verification key matches token"
            );
            AuthError::invalid_token()
        })?;

        let claims = decode_claims(token, key)?;
        self.check_claims(&claims, now)?;

        Ok(claims)
    }

    fn check_claims(&self, claims: &Claims, now: i64) -> Result<(), AuthError> {
        let reject = |reason: &'static str| {
            tracing::debug!(target: "gateway.auth.verifier", reason, "Token rejected");
            AuthError::invalid_token()
        };

        if !matches_expected(self.config.issuer.as_deref(), claims.issuer()) {
            return Err(reject("issuer mismatch"));
        }
        if !matches_expected(self.config.subject.as_deref(), claims.subject()) {
            return Err(reject("subject mismatch"));
        }
        if !matches_expected(self.config.token_id.as_deref(), claims.token_id()) {
            return Err(reject("token id mismatch"));
        }
        if !claims.has_audiences(&self.config.audiences) {
            return Err(reject("audience mismatch"));
        }

        jwt::check_not_before(claims.not_before(), self.config.leeway, now)?;
        jwt::check_expiry(claims.expires_at(), self.config.leeway, now)?;

        Ok(())
    }
}

fn matches_expected(expected: Option<&str>, actual: Option<&str>) -> bool {
    match expected {
        None | Some("") => true,
        Some(expected) => actual == Some(expected),
    }
}

/// Signature check and claim decoding. Claim checks are done by the caller.
fn decode_claims(token: &str, key: &VerificationKey) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(key.algorithm().jwt_algorithm());
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    validation.leeway = 0;

    jsonwebtoken::decode::<Claims>(token, key.decoding_key(), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(target: "gateway.auth.verifier", error = %e, "Token signature or claims invalid");
            AuthError::invalid_token()
        })
}
