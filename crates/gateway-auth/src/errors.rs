//! Gateway authentication and authorization errors.
//!
//! Every error maps to a fixed-shape JSON response. Messages returned to
//! clients are generic; details are logged server-side.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::jwt::JwtValidationError;
use common::policy::PolicyError;
use serde::Serialize;
use thiserror::Error;

/// Realm used when an error is rendered without gateway configuration.
pub const DEFAULT_REALM: &str = "gatekeeper";

/// Uniform client-facing message for every token rejection.
pub const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Gateway auth error type.
///
/// Maps to HTTP status codes:
/// - NoToken, InvalidToken: 401 Unauthorized
/// - Forbidden: 403 Forbidden
/// - KeyUnavailable: 503 Service Unavailable
/// - Config, Policy, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No token found in request")]
    NoToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Verification keys unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("Internal server error")]
    Internal,
}

impl AuthError {
    /// The uniform token rejection.
    pub fn invalid_token() -> Self {
        AuthError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string())
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::NoToken | AuthError::InvalidToken(_) => 401,
            AuthError::Forbidden(_) => 403,
            AuthError::KeyUnavailable(_) => 503,
            AuthError::Config(_) | AuthError::Policy(_) | AuthError::Internal => 500,
        }
    }

    /// Render the error, naming `realm` in the `WWW-Authenticate` challenge.
    pub fn into_response_with_realm(self, realm: &str) -> Response {
        let (status, code, message) = match &self {
            AuthError::NoToken => (
                StatusCode::UNAUTHORIZED,
                "NO_TOKEN",
                "An access token is required".to_string(),
            ),
            AuthError::InvalidToken(_) => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                INVALID_TOKEN_MESSAGE.to_string(),
            ),
            AuthError::Forbidden(reason) => (StatusCode::FORBIDDEN, "FORBIDDEN", reason.clone()),
            AuthError::KeyUnavailable(reason) => {
                tracing::warn!(target: "gateway.auth", reason = %reason, "Verification keys unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            AuthError::Config(reason) => {
                tracing::error!(target: "gateway.auth", reason = %reason, "Auth misconfiguration");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            AuthError::Policy(err) => {
                tracing::error!(target: "gateway.auth", error = %err, "Policy operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(value) = HeaderValue::from_str(&format!("JWT realm=\"{realm}\"")) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, value);
            }
        }

        response
    }
}

impl From<JwtValidationError> for AuthError {
    fn from(_: JwtValidationError) -> Self {
        AuthError::invalid_token()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.into_response_with_realm(DEFAULT_REALM)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::NoToken.status_code(), 401);
        assert_eq!(AuthError::invalid_token().status_code(), 401);
        assert_eq!(AuthError::Forbidden("x".to_string()).status_code(), 403);
        assert_eq!(AuthError::KeyUnavailable("x".to_string()).status_code(), 503);
        assert_eq!(AuthError::Config("x".to_string()).status_code(), 500);
        assert_eq!(
            AuthError::Policy(PolicyError::Replication("x".to_string())).status_code(),
            500
        );
        assert_eq!(AuthError::Internal.status_code(), 500);
    }

    #[test]
    fn test_jwt_errors_collapse_to_invalid_token() {
        let err: AuthError = JwtValidationError::Expired.into();
        assert!(matches!(err, AuthError::InvalidToken(ref m) if m == INVALID_TOKEN_MESSAGE));
    }

    #[tokio::test]
    async fn test_invalid_token_response_hides_detail() {
        let response = AuthError::InvalidToken("audience mismatch".to_string())
            .into_response_with_realm("content-api");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(challenge, "JWT realm=\"content-api\"");

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");
        assert_eq!(body["error"]["message"], INVALID_TOKEN_MESSAGE);
    }

    #[tokio::test]
    async fn test_forbidden_response_has_no_challenge() {
        let response = AuthError::Forbidden("Access denied".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_key_unavailable_is_generic_503() {
        let response = AuthError::KeyUnavailable("jwks endpoint down".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["message"], "Service temporarily unavailable");
    }

    #[tokio::test]
    async fn test_policy_error_is_generic_500() {
        let response =
            AuthError::Policy(PolicyError::Storage("db password wrong".to_string())).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }
}
