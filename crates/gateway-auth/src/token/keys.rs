//! Signing and verification key material.
//!
//! # Components
//!
//! - `SigningKey` - private key held by a token issuer
//! - `VerificationKeys` - public (or shared) keys indexed by thumbprint key id
//! - `KeyMaterialProvider` - source of the current `VerificationKeys`
//!   - `StaticKeyProvider` - fixed at construction
//!   - `RemoteJwksProvider` - fetched from a JWKS document and cached with a TTL

use crate::errors::AuthError;
use crate::observability::metrics;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use common::jwks::{self, JsonWebKey, JwkSet};
use common::secret::{ExposeSecret, SecretBox, SecretString};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use ring::signature::{Ed25519KeyPair, KeyPair};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::instrument;

/// Default JWKS cache TTL in seconds (5 minutes).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 300;

/// Timeout for a single JWKS fetch.
pub const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before retrying after a failed fetch while serving stale keys.
const FAILED_FETCH_RETRY: Duration = Duration::from_secs(10);

/// Minimum spacing between refreshes triggered by an unknown key id.
pub const UNKNOWN_KID_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

// =============================================================================
// Algorithms
// =============================================================================

/// Signing algorithms the gateway issues and accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    EdDSA,
    HS256,
    HS384,
    HS512,
}

impl SigningAlgorithm {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SigningAlgorithm::EdDSA => "EdDSA",
            SigningAlgorithm::HS256 => "HS256",
            SigningAlgorithm::HS384 => "HS384",
            SigningAlgorithm::HS512 => "HS512",
        }
    }

    #[must_use]
    pub fn jwt_algorithm(self) -> Algorithm {
        match self {
            SigningAlgorithm::EdDSA => Algorithm::EdDSA,
            SigningAlgorithm::HS256 => Algorithm::HS256,
            SigningAlgorithm::HS384 => Algorithm::HS384,
            SigningAlgorithm::HS512 => Algorithm::HS512,
        }
    }

    #[must_use]
    pub fn is_symmetric(self) -> bool {
        !matches!(self, SigningAlgorithm::EdDSA)
    }
}

impl FromStr for SigningAlgorithm {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EdDSA" => Ok(SigningAlgorithm::EdDSA),
            "HS256" => Ok(SigningAlgorithm::HS256),
            "HS384" => Ok(SigningAlgorithm::HS384),
            "HS512" => Ok(SigningAlgorithm::HS512),
            other => Err(AuthError::Config(format!(
                "unsupported signing algorithm '{other}'"
            ))),
        }
    }
}

// =============================================================================
// SigningKey
// =============================================================================

enum SigningSecret {
    Ed25519 {
        pkcs8: SecretBox<Vec<u8>>,
        public_key: Vec<u8>,
    },
    Hmac {
        secret: SecretBox<Vec<u8>>,
    },
}

/// Private key material of a token issuer.
pub struct SigningKey {
    algorithm: SigningAlgorithm,
    kid: String,
    secret: SigningSecret,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm)
            .field("kid", &self.kid)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl SigningKey {
    /// Build from an Ed25519 PKCS#8 document.
    ///
    /// # Errors
    ///
    /// `Config` when the document is not a valid Ed25519 private key.
    pub fn ed25519_from_pkcs8(pkcs8: &[u8]) -> Result<Self, AuthError> {
        let key_pair = Ed25519KeyPair::from_pkcs8_maybe_unchecked(pkcs8).map_err(|e| {
            AuthError::Config(format!("invalid Ed25519 PKCS#8 signing key: {e}"))
        })?;
        let public_key = key_pair.public_key().as_ref().to_vec();

        Ok(Self {
            algorithm: SigningAlgorithm::EdDSA,
            kid: jwks::ed25519_thumbprint(&public_key),
            secret: SigningSecret::Ed25519 {
                pkcs8: SecretBox::new(Box::new(pkcs8.to_vec())),
                public_key,
            },
        })
    }

    /// Build an HMAC key from a shared secret.
    ///
    /// # Errors
    ///
    /// `Config` when `algorithm` is not an HMAC algorithm or the secret is empty.
    pub fn hmac(algorithm: SigningAlgorithm, secret: &[u8]) -> Result<Self, AuthError> {
        if !algorithm.is_symmetric() {
            return Err(AuthError::Config(format!(
                "{} is not an HMAC algorithm",
                algorithm.as_str()
            )));
        }
        if secret.is_empty() {
            return Err(AuthError::Config("HMAC signing secret is empty".to_string()));
        }

        Ok(Self {
            algorithm,
            kid: jwks::oct_thumbprint(secret),
            secret: SigningSecret::Hmac {
                secret: SecretBox::new(Box::new(secret.to_vec())),
            },
        })
    }

    /// Build from configuration: base64 PKCS#8 for EdDSA, the raw secret for HMAC.
    ///
    /// # Errors
    ///
    /// `Config` when the encoded key does not fit the algorithm.
    pub fn from_config(algorithm: SigningAlgorithm, encoded: &SecretString) -> Result<Self, AuthError> {
        match algorithm {
            SigningAlgorithm::EdDSA => {
                let pkcs8 = STANDARD.decode(encoded.expose_secret().trim()).map_err(|e| {
                    AuthError::Config(format!("signing key is not valid base64: {e}"))
                })?;
                Self::ed25519_from_pkcs8(&pkcs8)
            }
            _ => Self::hmac(algorithm, encoded.expose_secret().as_bytes()),
        }
    }

    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    #[must_use]
    pub fn encoding_key(&self) -> EncodingKey {
        match &self.secret {
            SigningSecret::Ed25519 { pkcs8, .. } => EncodingKey::from_ed_der(pkcs8.expose_secret()),
            SigningSecret::Hmac { secret } => EncodingKey::from_secret(secret.expose_secret()),
        }
    }

    /// Key a verifier in the same process uses for tokens signed by this key.
    #[must_use]
    pub fn verification_key(&self) -> VerificationKey {
        let decoding = match &self.secret {
            SigningSecret::Ed25519 { public_key, .. } => DecodingKey::from_ed_der(public_key),
            SigningSecret::Hmac { secret } => DecodingKey::from_secret(secret.expose_secret()),
        };
        VerificationKey {
            kid: self.kid.clone(),
            algorithm: self.algorithm,
            decoding,
        }
    }

    /// Publishable form of the public key; `None` for symmetric keys.
    #[must_use]
    pub fn public_jwk(&self) -> Option<JsonWebKey> {
        match &self.secret {
            SigningSecret::Ed25519 { public_key, .. } => Some(JsonWebKey::ed25519(public_key)),
            SigningSecret::Hmac { .. } => None,
        }
    }
}

// =============================================================================
// VerificationKeys
// =============================================================================

/// One key usable for signature verification.
#[derive(Clone)]
pub struct VerificationKey {
    kid: String,
    algorithm: SigningAlgorithm,
    decoding: DecodingKey,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// Build from a published JWK. Returns `None` for unsupported key types.
    #[must_use]
    pub fn from_jwk(jwk: &JsonWebKey) -> Option<Self> {
        if !jwk.is_ed25519() {
            return None;
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != "EdDSA") {
            return None;
        }
        let public_key = common::jwt::decode_ed25519_public_key_jwk(jwk.x.as_deref()?).ok()?;
        Some(Self {
            kid: jwk.kid.clone(),
            algorithm: SigningAlgorithm::EdDSA,
            decoding: DecodingKey::from_ed_der(&public_key),
        })
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

/// Verification keys indexed by key id.
#[derive(Debug, Clone, Default)]
pub struct VerificationKeys {
    keys: HashMap<String, VerificationKey>,
}

impl VerificationKeys {
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = VerificationKey>) -> Self {
        Self {
            keys: keys.into_iter().map(|k| (k.kid.clone(), k)).collect(),
        }
    }

    /// Keep the supported keys of a JWKS document.
    #[must_use]
    pub fn from_jwk_set(set: &JwkSet) -> Self {
        Self::new(set.keys.iter().filter_map(|jwk| {
            let key = VerificationKey::from_jwk(jwk);
            if key.is_none() {
                tracing::debug!(target: "gateway.auth.keys", kid = %jwk.kid, kty = %jwk.kty, "Skipping unsupported JWK");
            }
            key
        }))
    }

    /// Select by `kid`. Without a `kid`, a lone key is used.
    #[must_use]
    pub fn select(&self, kid: Option<&str>) -> Option<&VerificationKey> {
        match kid {
            Some(kid) => self.keys.get(kid),
            None if self.keys.len() == 1 => self.keys.values().next(),
            None => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// =============================================================================
// Providers
// =============================================================================

/// Supplies the verification keys current at call time.
#[async_trait]
pub trait KeyMaterialProvider: Send + Sync {
    /// # Errors
    ///
    /// `KeyUnavailable` when no key set can be produced.
    async fn get(&self) -> Result<Arc<VerificationKeys>, AuthError>;

    /// Keys for verifying a token signed with `kid`. Providers that can
    /// reload pick up a newly rotated key here.
    ///
    /// # Errors
    ///
    /// `KeyUnavailable` when no key set can be produced.
    async fn get_for_key(&self, _kid: &str) -> Result<Arc<VerificationKeys>, AuthError> {
        self.get().await
    }
}

/// Provider over a fixed key set.
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    keys: Arc<VerificationKeys>,
}

impl StaticKeyProvider {
    #[must_use]
    pub fn new(keys: VerificationKeys) -> Self {
        Self {
            keys: Arc::new(keys),
        }
    }
}

#[async_trait]
impl KeyMaterialProvider for StaticKeyProvider {
    async fn get(&self) -> Result<Arc<VerificationKeys>, AuthError> {
        Ok(Arc::clone(&self.keys))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum JwksSource {
    Http(String),
    File(String),
}

struct CachedKeys {
    keys: Arc<VerificationKeys>,
    expires_at: Instant,
}

/// Provider fetching a JWKS document from `http(s)://` or `file://`.
///
/// Fresh entries are served from the cache. Once the TTL elapses one caller
/// refreshes while concurrent callers keep the stale set. A failed refresh
/// keeps serving the stale set; with nothing cached it fails.
///
/// A token whose `kid` is not cached triggers one early refresh, at most once
/// per [`UNKNOWN_KID_REFRESH_INTERVAL`].
pub struct RemoteJwksProvider {
    source: JwksSource,
    http_client: OnceCell<reqwest::Client>,
    cache: RwLock<Option<CachedKeys>>,
    /// Serializes refreshes; holds the time of the last unknown-kid refresh.
    refresh_lock: Mutex<Option<Instant>>,
    cache_ttl: Duration,
}

impl RemoteJwksProvider {
    /// # Errors
    ///
    /// `Config` for URLs that are neither `http(s)://` nor `file://`.
    pub fn new(url: &str, cache_ttl: Duration) -> Result<Self, AuthError> {
        let source = if let Some(path) = url.strip_prefix("file://") {
            JwksSource::File(path.to_string())
        } else if url.starts_with("http://") || url.starts_with("https://") {
            JwksSource::Http(url.to_string())
        } else {
            return Err(AuthError::Config(format!(
                "unsupported JWKS URL scheme: {url}"
            )));
        };

        Ok(Self {
            source,
            http_client: OnceCell::new(),
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(None),
            cache_ttl,
        })
    }

    async fn cached(&self, fresh_only: bool) -> Option<Arc<VerificationKeys>> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|c| !fresh_only || c.expires_at > Instant::now())
            .map(|c| Arc::clone(&c.keys))
    }

    async fn client(&self) -> Result<&reqwest::Client, AuthError> {
        self.http_client
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .timeout(JWKS_FETCH_TIMEOUT)
                    .build()
                    .map_err(|e| AuthError::KeyUnavailable(format!("HTTP client: {e}")))
            })
            .await
    }

    #[instrument(skip_all)]
    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        match &self.source {
            JwksSource::Http(url) => {
                tracing::debug!(target: "gateway.auth.jwks", url = %url, "Fetching JWKS");
                let response = self.client().await?.get(url).send().await.map_err(|e| {
                    AuthError::KeyUnavailable(format!("JWKS request failed: {e}"))
                })?;

                if !response.status().is_success() {
                    return Err(AuthError::KeyUnavailable(format!(
                        "JWKS endpoint returned {}",
                        response.status()
                    )));
                }

                response
                    .json::<JwkSet>()
                    .await
                    .map_err(|e| AuthError::KeyUnavailable(format!("JWKS body invalid: {e}")))
            }
            JwksSource::File(path) => {
                tracing::debug!(target: "gateway.auth.jwks", path = %path, "Reading JWKS file");
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| AuthError::KeyUnavailable(format!("JWKS file unreadable: {e}")))?;
                serde_json::from_slice(&bytes)
                    .map_err(|e| AuthError::KeyUnavailable(format!("JWKS file invalid: {e}")))
            }
        }
    }

    async fn refresh(&self) -> Result<Arc<VerificationKeys>, AuthError> {
        match self.fetch().await {
            Ok(set) => {
                let keys = Arc::new(VerificationKeys::from_jwk_set(&set));
                tracing::debug!(target: "gateway.auth.jwks", key_count = keys.len(), "JWKS cache refreshed");
                metrics::record_jwks_fetch("success");

                let mut cache = self.cache.write().await;
                *cache = Some(CachedKeys {
                    keys: Arc::clone(&keys),
                    expires_at: Instant::now() + self.cache_ttl,
                });
                Ok(keys)
            }
            Err(e) => {
                metrics::record_jwks_fetch("error");
                let mut cache = self.cache.write().await;
                match cache.as_mut() {
                    Some(stale) => {
                        tracing::warn!(target: "gateway.auth.jwks", error = %e, "JWKS refresh failed, serving cached keys");
                        stale.expires_at = Instant::now() + FAILED_FETCH_RETRY.min(self.cache_ttl);
                        Ok(Arc::clone(&stale.keys))
                    }
                    None => {
                        tracing::error!(target: "gateway.auth.jwks", error = %e, "JWKS fetch failed with no cached keys");
                        Err(e)
                    }
                }
            }
        }
    }
}

#[async_trait]
impl KeyMaterialProvider for RemoteJwksProvider {
    async fn get(&self) -> Result<Arc<VerificationKeys>, AuthError> {
        if let Some(keys) = self.cached(true).await {
            return Ok(keys);
        }

        let _guard = match self.refresh_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                if let Some(stale) = self.cached(false).await {
                    return Ok(stale);
                }
                self.refresh_lock.lock().await
            }
        };

        // a concurrent refresh may have completed while waiting
        if let Some(keys) = self.cached(true).await {
            return Ok(keys);
        }

        self.refresh().await
    }

    async fn get_for_key(&self, kid: &str) -> Result<Arc<VerificationKeys>, AuthError> {
        let keys = self.get().await?;
        if keys.select(Some(kid)).is_some() {
            return Ok(keys);
        }

        let mut last_forced = self.refresh_lock.lock().await;

        // a concurrent refresh may have fetched the key while waiting
        let keys = self.cached(false).await.unwrap_or(keys);
        if keys.select(Some(kid)).is_some() {
            return Ok(keys);
        }

        if last_forced.is_some_and(|at| at.elapsed() < UNKNOWN_KID_REFRESH_INTERVAL) {
            tracing::debug!(target: "gateway.auth.jwks", kid = %kid, "Unknown key id, refresh rate limited");
            return Ok(keys);
        }

        tracing::info!(target: "gateway.auth.jwks", kid = %kid, "Unknown key id, refreshing JWKS");
        *last_forced = Some(Instant::now());
        self.refresh().await
    }
}
