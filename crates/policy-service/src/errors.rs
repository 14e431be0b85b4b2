//! Policy service errors.

use crate::config::ConfigError;
use common::policy::PolicyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid seed file: {0}")]
    Seed(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl From<PolicyServiceError> for PolicyError {
    fn from(err: PolicyServiceError) -> Self {
        match err {
            PolicyServiceError::Policy(inner) => inner,
            other => PolicyError::Storage(other.to_string()),
        }
    }
}
