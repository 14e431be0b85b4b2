//! Gateway auth configuration.
//!
//! Configuration is loaded from environment variables. The signing key is
//! held as a secret and redacted in Debug output.

use crate::policy::adapter::{ReplicationClientConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RPC_TIMEOUT};
use crate::policy::enforcer::{EnforcerConfig, DEFAULT_ANONYMOUS_SUBJECT};
use crate::policy::reload::{ReloadSchedule, DEFAULT_RELOAD_INTERVAL};
use crate::token::keys::{SigningAlgorithm, DEFAULT_JWKS_CACHE_TTL_SECONDS};
use crate::token::lookup::TokenLookup;
use crate::token::{IssuerConfig, VerifierConfig};
use common::jwt::{DEFAULT_LEEWAY, MAX_LEEWAY};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Gateway auth configuration.
#[derive(Clone)]
pub struct GatewayAuthConfig {
    /// Realm named in `WWW-Authenticate` challenges.
    pub realm: String,

    /// Where request tokens are read from (default `header:Authorization:Bearer`).
    pub token_lookup: TokenLookup,

    /// Tolerance for `nbf`/`exp` (default 60s).
    pub leeway: Duration,

    /// Required `iss` on verified tokens, and `iss` of issued tokens.
    pub issuer: Option<String>,

    /// Required `sub` on verified tokens.
    pub subject: Option<String>,

    /// Required `jti` on verified tokens.
    pub token_id: Option<String>,

    /// Audiences every verified token must carry.
    pub audiences: Vec<String>,

    /// Algorithm of the local signing key.
    pub signing_algorithm: Option<SigningAlgorithm>,

    /// Local signing key: base64 PKCS#8 for EdDSA, raw secret for HMAC.
    pub signing_key: Option<SecretString>,

    /// Remote JWKS document (`http(s)://` or `file://`).
    pub jwks_url: Option<String>,

    pub jwks_cache_ttl: Duration,

    /// Replication server address.
    pub policy_service_url: String,

    pub reload_interval: Duration,

    /// Bound on each replication call and each scheduled reload.
    pub rpc_timeout: Duration,

    /// Subject evaluated for requests without a token.
    pub anonymous_subject: String,
}

impl fmt::Debug for GatewayAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayAuthConfig")
            .field("realm", &self.realm)
            .field("token_lookup", &self.token_lookup.to_string())
            .field("leeway", &self.leeway)
            .field("issuer", &self.issuer)
            .field("subject", &self.subject.as_ref().map(|_| "[REDACTED]"))
            .field("token_id", &self.token_id)
            .field("audiences", &self.audiences)
            .field("signing_algorithm", &self.signing_algorithm)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "[REDACTED]"))
            .field("jwks_url", &self.jwks_url)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("policy_service_url", &self.policy_service_url)
            .field("reload_interval", &self.reload_interval)
            .field("rpc_timeout", &self.rpc_timeout)
            .field("anonymous_subject", &self.anonymous_subject)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("No key material configured: set JWT_SIGNING_KEY or JWT_JWKS_URL")]
    MissingKeyFunction,

    #[error("JWT_SIGNING_KEY and JWT_SIGNING_ALGORITHM must be set together")]
    IncompleteSigningKey,
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        reason: reason.into(),
    }
}

/// A non-empty value, if set.
fn optional(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    optional(vars, name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Whole seconds, strictly positive.
fn positive_seconds(
    vars: &HashMap<String, String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(value) = optional(vars, name) else {
        return Ok(default);
    };
    let secs: u64 = value
        .parse()
        .map_err(|e| invalid(name, format!("must be a positive integer, got '{value}': {e}")))?;
    if secs == 0 {
        return Err(invalid(name, "must be greater than 0"));
    }
    Ok(Duration::from_secs(secs))
}

impl GatewayAuthConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`GatewayAuthConfig::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a map of variables.
    ///
    /// # Errors
    ///
    /// - `MissingEnvVar` for `AUTH_REALM` or `POLICY_SERVICE_URL`
    /// - `InvalidValue` for unparsable or out-of-range values
    /// - `MissingKeyFunction` when neither a signing key nor a JWKS URL is set
    /// - `IncompleteSigningKey` when only one of key and algorithm is set
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let realm = required(vars, "AUTH_REALM")?;
        let policy_service_url = required(vars, "POLICY_SERVICE_URL")?;

        let token_lookup = match optional(vars, "JWT_TOKEN_LOOKUP") {
            Some(spec) => spec
                .parse()
                .map_err(|e| invalid("JWT_TOKEN_LOOKUP", format!("{e}")))?,
            None => TokenLookup::default(),
        };

        let leeway = match optional(vars, "JWT_LEEWAY_SECONDS") {
            Some(value) => {
                let secs: u64 = value.parse().map_err(|e| {
                    invalid(
                        "JWT_LEEWAY_SECONDS",
                        format!("must be a non-negative integer, got '{value}': {e}"),
                    )
                })?;
                if secs > MAX_LEEWAY.as_secs() {
                    return Err(invalid(
                        "JWT_LEEWAY_SECONDS",
                        format!("must not exceed {} seconds, got {secs}", MAX_LEEWAY.as_secs()),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_LEEWAY,
        };

        let audiences = optional(vars, "JWT_AUDIENCE")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let signing_algorithm = optional(vars, "JWT_SIGNING_ALGORITHM")
            .map(|alg| {
                alg.parse::<SigningAlgorithm>()
                    .map_err(|_| invalid("JWT_SIGNING_ALGORITHM", format!("unsupported algorithm '{alg}'")))
            })
            .transpose()?;

        // the key itself is never trimmed or echoed
        let signing_key = vars
            .get("JWT_SIGNING_KEY")
            .filter(|k| !k.is_empty())
            .map(|k| SecretString::from(k.clone()));

        if signing_key.is_some() != signing_algorithm.is_some() {
            return Err(ConfigError::IncompleteSigningKey);
        }

        let jwks_url = optional(vars, "JWT_JWKS_URL");
        if signing_key.is_none() && jwks_url.is_none() {
            return Err(ConfigError::MissingKeyFunction);
        }

        let jwks_cache_ttl = positive_seconds(
            vars,
            "JWT_JWKS_CACHE_TTL_SECONDS",
            Duration::from_secs(DEFAULT_JWKS_CACHE_TTL_SECONDS),
        )?;
        let reload_interval =
            positive_seconds(vars, "POLICY_RELOAD_INTERVAL_SECONDS", DEFAULT_RELOAD_INTERVAL)?;
        let rpc_timeout = positive_seconds(vars, "POLICY_RPC_TIMEOUT_SECONDS", DEFAULT_RPC_TIMEOUT)?;

        let anonymous_subject = optional(vars, "POLICY_ANONYMOUS_SUBJECT")
            .unwrap_or_else(|| DEFAULT_ANONYMOUS_SUBJECT.to_string());

        Ok(Self {
            realm,
            token_lookup,
            leeway,
            issuer: optional(vars, "JWT_ISSUER"),
            subject: optional(vars, "JWT_SUBJECT"),
            token_id: optional(vars, "JWT_ID"),
            audiences,
            signing_algorithm,
            signing_key,
            jwks_url,
            jwks_cache_ttl,
            policy_service_url,
            reload_interval,
            rpc_timeout,
            anonymous_subject,
        })
    }

    #[must_use]
    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            lookup: self.token_lookup.clone(),
            leeway: self.leeway,
            issuer: self.issuer.clone(),
            subject: self.subject.clone(),
            token_id: self.token_id.clone(),
            audiences: self.audiences.clone(),
        }
    }

    /// Issuer settings when a local signing key is configured.
    #[must_use]
    pub fn issuer_config(&self) -> Option<IssuerConfig> {
        self.signing_key.as_ref().map(|key| IssuerConfig {
            algorithm: self.signing_algorithm,
            signing_key: Some(key.clone()),
            issuer: self.issuer.clone(),
        })
    }

    #[must_use]
    pub fn replication_config(&self) -> ReplicationClientConfig {
        ReplicationClientConfig {
            endpoint: self.policy_service_url.clone(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            rpc_timeout: self.rpc_timeout,
        }
    }

    #[must_use]
    pub fn reload_schedule(&self) -> ReloadSchedule {
        ReloadSchedule {
            interval: self.reload_interval,
            timeout: self.rpc_timeout,
        }
    }

    #[must_use]
    pub fn enforcer_config(&self) -> EnforcerConfig {
        EnforcerConfig {
            anonymous_subject: self.anonymous_subject.clone(),
        }
    }
}
