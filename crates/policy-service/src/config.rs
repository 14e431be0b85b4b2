//! Policy service configuration.
//!
//! Loaded from environment variables. `DATABASE_URL` is held as a secret and
//! never appears in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default gRPC bind address.
pub const DEFAULT_GRPC_BIND_ADDRESS: &str = "0.0.0.0:50061";

/// Default drain period after a shutdown signal.
pub const DEFAULT_DRAIN_SECONDS: u64 = 30;

/// Where rules are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// `policy_rules` table in PostgreSQL.
    Postgres,
    /// Process memory, lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::InvalidValue {
                name: "POLICY_STORE",
                reason: format!("expected 'postgres' or 'memory', got '{other}'"),
            }),
        }
    }
}

/// Policy service configuration.
#[derive(Clone)]
pub struct Config {
    pub store: StoreBackend,

    /// Database connection string, required for the postgres backend.
    pub database_url: Option<SecretString>,

    pub grpc_bind_address: SocketAddr,

    /// JSON list of records applied when the store starts empty.
    pub seed_file: Option<PathBuf>,

    /// Time to keep serving after a shutdown signal.
    pub drain_period: Duration,

    /// Prometheus scrape endpoint, disabled when unset.
    pub metrics_bind_address: Option<SocketAddr>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("store", &self.store)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("grpc_bind_address", &self.grpc_bind_address)
            .field("seed_file", &self.seed_file)
            .field("drain_period", &self.drain_period)
            .field("metrics_bind_address", &self.metrics_bind_address)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

fn optional(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn socket_addr(name: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|e| ConfigError::InvalidValue {
        name,
        reason: format!("'{value}' is not a socket address: {e}"),
    })
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a map of variables.
    ///
    /// # Errors
    ///
    /// - `MissingEnvVar` when the postgres backend has no `DATABASE_URL`
    /// - `InvalidValue` for an unknown backend, a malformed address or a
    ///   non-numeric drain period
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let store = match optional(vars, "POLICY_STORE") {
            Some(value) => value.parse()?,
            None => StoreBackend::Postgres,
        };

        let database_url = vars
            .get("DATABASE_URL")
            .filter(|url| !url.is_empty())
            .map(|url| SecretString::from(url.clone()));
        if store == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
        }

        let grpc_bind_address = socket_addr(
            "GRPC_BIND_ADDRESS",
            &optional(vars, "GRPC_BIND_ADDRESS")
                .unwrap_or_else(|| DEFAULT_GRPC_BIND_ADDRESS.to_string()),
        )?;

        let metrics_bind_address = optional(vars, "METRICS_BIND_ADDRESS")
            .map(|addr| socket_addr("METRICS_BIND_ADDRESS", &addr))
            .transpose()?;

        let drain_period = match optional(vars, "DRAIN_SECONDS") {
            Some(value) => {
                let secs: u64 = value.parse().map_err(|e| ConfigError::InvalidValue {
                    name: "DRAIN_SECONDS",
                    reason: format!("must be a non-negative integer, got '{value}': {e}"),
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_DRAIN_SECONDS),
        };

        Ok(Self {
            store,
            database_url,
            grpc_bind_address,
            seed_file: optional(vars, "POLICY_SEED_FILE").map(PathBuf::from),
            drain_period,
            metrics_bind_address,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_postgres_defaults() {
        let config =
            Config::from_vars(&vars(&[("DATABASE_URL", "postgres://u:p@db/policy")])).unwrap();

        assert_eq!(config.store, StoreBackend::Postgres);
        assert_eq!(config.grpc_bind_address, "0.0.0.0:50061".parse().unwrap());
        assert_eq!(config.drain_period, Duration::from_secs(30));
        assert!(config.seed_file.is_none());
        assert!(config.metrics_bind_address.is_none());
        assert_eq!(
            config.database_url.unwrap().expose_secret(),
            "postgres://u:p@db/policy"
        );
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = Config::from_vars(&HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "DATABASE_URL"));
    }

    #[test]
    fn test_memory_store_without_database() {
        let config = Config::from_vars(&vars(&[
            ("POLICY_STORE", "Memory"),
            ("POLICY_SEED_FILE", "/etc/gatekeeper/rules.json"),
            ("DRAIN_SECONDS", "0"),
            ("METRICS_BIND_ADDRESS", "127.0.0.1:9090"),
        ]))
        .unwrap();

        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(
            config.seed_file.as_deref(),
            Some(std::path::Path::new("/etc/gatekeeper/rules.json"))
        );
        assert_eq!(config.drain_period, Duration::ZERO);
        assert_eq!(
            config.metrics_bind_address,
            Some("127.0.0.1:9090".parse().unwrap())
        );
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_vars(&vars(&[("POLICY_STORE", "redis")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "POLICY_STORE", .. }));

        let err = Config::from_vars(&vars(&[
            ("POLICY_STORE", "memory"),
            ("GRPC_BIND_ADDRESS", "localhost"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "GRPC_BIND_ADDRESS", .. }));

        let err = Config::from_vars(&vars(&[
            ("POLICY_STORE", "memory"),
            ("DRAIN_SECONDS", "-1"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "DRAIN_SECONDS", .. }));
    }

    #[test]
    fn test_debug_redacts_database_url() {
        let config =
            Config::from_vars(&vars(&[("DATABASE_URL", "postgres://u:hunter2@db/policy")]))
                .unwrap();
        let debug = format!("{config:?}");

        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
