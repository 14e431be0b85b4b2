//! JWT primitives shared by token issuance and verification.
//!
//! This module provides:
//! - Size limits applied before any parsing
//! - Leeway constants for the temporal claim checks
//! - Header inspection (`alg`, `kid`) without signature verification
//! - The `nbf`/`exp` window checks
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Every error renders the same message so callers cannot learn which check failed
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{inspect_header, check_expiry, DEFAULT_LEEWAY};
//!
//! let header = inspect_header(token)?;
//! // ... select key by header.kid, verify signature, decode claims ...
//! check_expiry(claims.exp, DEFAULT_LEEWAY, now)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical tokens are a few hundred bytes. Anything larger is rejected before
/// base64 decoding or signature work is attempted.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default leeway applied symmetrically to `nbf` and `exp` (1 minute).
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(60);

/// Upper bound for a configured leeway (10 minutes).
pub const MAX_LEEWAY: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting or time-checking a JWT.
///
/// Every variant renders the same generic message. The variant itself is
/// available to server-side logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is not a three-part compact JWS or its header is not JSON.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token has no usable `nbf` or `exp` claim.
    #[error("The access token is invalid or expired")]
    MissingTemporalClaim,

    /// `nbf` lies beyond `now + leeway`.
    #[error("The access token is invalid or expired")]
    NotYetValid,

    /// `exp` lies before `now - leeway`.
    #[error("The access token is invalid or expired")]
    Expired,
}

// =============================================================================
// Header Inspection
// =============================================================================

/// The unverified JOSE header of a compact token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Signing algorithm named by the token.
    pub alg: String,

    /// Key ID, if the issuer set one. Empty strings are treated as absent.
    #[serde(default)]
    pub kid: Option<String>,

    /// Token type, usually `JWT`.
    #[serde(default)]
    pub typ: Option<String>,
}

/// Decode the header of a compact JWT without verifying the signature.
///
/// The result is only good for key selection. The token MUST still be
/// verified against the selected key.
///
/// # Errors
///
/// - `TokenTooLarge` when the token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` for a wrong part count, bad base64 or bad JSON
pub fn inspect_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let mut header: TokenHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    if header.kid.as_deref() == Some("") {
        header.kid = None;
    }

    Ok(header)
}

// =============================================================================
// Temporal Checks
// =============================================================================

#[allow(clippy::cast_possible_wrap)] // leeway is bounded by MAX_LEEWAY
fn leeway_secs(leeway: Duration) -> i64 {
    leeway.as_secs() as i64
}

/// Reject tokens whose `nbf` is later than `now + leeway`.
///
/// # Errors
///
/// `MissingTemporalClaim` when `nbf` is absent, `NotYetValid` when it is in
/// the future beyond the leeway.
pub fn check_not_before(
    nbf: Option<i64>,
    leeway: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    let nbf = nbf.ok_or(JwtValidationError::MissingTemporalClaim)?;
    let latest = now.saturating_add(leeway_secs(leeway));

    if nbf > latest {
        tracing::debug!(
            target: "common.jwt",
            nbf = nbf,
            now = now,
            "Token rejected: not valid yet"
        );
        return Err(JwtValidationError::NotYetValid);
    }

    Ok(())
}

/// Reject tokens whose `exp` is earlier than `now - leeway`.
///
/// # Errors
///
/// `MissingTemporalClaim` when `exp` is absent, `Expired` when it lies
/// before the leeway window.
pub fn check_expiry(exp: Option<i64>, leeway: Duration, now: i64) -> Result<(), JwtValidationError> {
    let exp = exp.ok_or(JwtValidationError::MissingTemporalClaim)?;
    let earliest = now.saturating_sub(leeway_secs(leeway));

    if exp < earliest {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired);
    }

    Ok(())
}

/// Decode an Ed25519 public key from a JWK `x` field (base64url, no padding).
///
/// # Errors
///
/// Returns `base64::DecodeError` if the value is not valid base64url.
pub fn decode_ed25519_public_key_jwk(x_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(x_b64url)
}

// =============================================================================
// Tests
// =============================================================================
