//! Token issuance.

use crate::errors::AuthError;
use crate::token::claims::{Claims, RESERVED_CLAIMS};
use crate::token::keys::{SigningAlgorithm, SigningKey, StaticKeyProvider, VerificationKeys};
use common::jwks::JwkSet;
use common::secret::SecretString;
use jsonwebtoken::{encode, Header};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::instrument;

/// Issuer settings. Both `algorithm` and `signing_key` are required.
#[derive(Clone, Default)]
pub struct IssuerConfig {
    pub algorithm: Option<SigningAlgorithm>,

    /// Base64 PKCS#8 document for EdDSA, the shared secret for HMAC.
    pub signing_key: Option<SecretString>,

    /// Value of `iss` on issued tokens.
    pub issuer: Option<String>,
}

impl std::fmt::Debug for IssuerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerConfig")
            .field("algorithm", &self.algorithm)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "[REDACTED]"))
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Signs tokens with a single key.
#[derive(Debug)]
pub struct TokenIssuer {
    key: SigningKey,
    issuer: Option<String>,
}

impl TokenIssuer {
    /// # Errors
    ///
    /// `Config` when the algorithm or key is missing or the key does not fit
    /// the algorithm.
    pub fn new(config: IssuerConfig) -> Result<Self, AuthError> {
        let algorithm = config
            .algorithm
            .ok_or_else(|| AuthError::Config("signing algorithm is required".to_string()))?;
        let encoded = config
            .signing_key
            .as_ref()
            .ok_or_else(|| AuthError::Config("signing key is required".to_string()))?;

        let key = SigningKey::from_config(algorithm, encoded)?;
        tracing::info!(
            target: "gateway.auth.issuer",
            algorithm = algorithm.as_str(),
            kid = %key.kid(),
            "Token issuer initialized"
        );

        Ok(Self::from_signing_key(key, config.issuer))
    }

    #[must_use]
    pub fn from_signing_key(key: SigningKey, issuer: Option<String>) -> Self {
        Self { key, issuer }
    }

    #[must_use]
    pub fn key_id(&self) -> &str {
        self.key.kid()
    }

    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.key.algorithm()
    }

    /// Issue a token valid from now for `timeout`.
    ///
    /// # Errors
    ///
    /// `Internal` when signing fails.
    pub fn issue(
        &self,
        timeout: Duration,
        subject: &str,
        audiences: &[String],
        custom: Map<String, Value>,
    ) -> Result<String, AuthError> {
        self.issue_at(
            timeout,
            subject,
            audiences,
            custom,
            chrono::Utc::now().timestamp(),
        )
    }

    /// Issue a token as of `now` (Unix seconds).
    ///
    /// Registered claim names in `custom` are dropped; the issuer always
    /// controls `sub`, `iss`, `aud`, `jti`, `iat`, `nbf` and `exp`.
    ///
    /// # Errors
    ///
    /// `Internal` when signing fails.
    #[instrument(skip_all, name = "gateway.auth.issue")]
    pub fn issue_at(
        &self,
        timeout: Duration,
        subject: &str,
        audiences: &[String],
        mut custom: Map<String, Value>,
        now: i64,
    ) -> Result<String, AuthError> {
        custom.retain(|name, _| {
            let reserved = RESERVED_CLAIMS.contains(&name.as_str());
            if reserved {
                tracing::debug!(target: "gateway.auth.issuer", claim = %name, "Dropping reserved custom claim");
            }
            !reserved
        });

        let lifetime = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: Some(subject.to_string()),
            iss: self.issuer.clone(),
            aud: audiences.to_vec(),
            jti: Some(uuid::Uuid::new_v4().to_string()),
            iat: Some(now),
            nbf: Some(now),
            exp: Some(now.saturating_add(lifetime)),
            custom,
        };

        let mut header = Header::new(self.key.algorithm().jwt_algorithm());
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.key.kid().to_string());

        encode(&header, &claims, &self.key.encoding_key()).map_err(|e| {
            tracing::error!(target: "gateway.auth.issuer", error = %e, "Failed to sign token");
            AuthError::Internal
        })
    }

    /// The JWKS document of this issuer. Empty for HMAC keys.
    #[must_use]
    pub fn public_key_set(&self) -> JwkSet {
        JwkSet {
            keys: self.key.public_jwk().into_iter().collect(),
        }
    }

    /// Keys that verify tokens from this issuer.
    #[must_use]
    pub fn verification_keys(&self) -> VerificationKeys {
        VerificationKeys::new([self.key.verification_key()])
    }

    /// In-process key source for a verifier trusting this issuer.
    #[must_use]
    pub fn key_provider(&self) -> StaticKeyProvider {
        StaticKeyProvider::new(self.verification_keys())
    }
}
