//! Authorization middleware for protected routes.
//!
//! Reads the token from the configured location, verifies it, and asks the
//! policy enforcer whether the subject may call the route. Verified claims
//! are stored in request extensions for handlers.

use crate::errors::AuthError;
use crate::policy::PolicyEnforcer;
use crate::token::{Claims, TokenVerifier};
use axum::{
    extract::{OriginalUri, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

/// How a request without a token is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Missing token is a 401 challenge.
    Required,
    /// Missing token is evaluated as the anonymous (empty) subject.
    Optional,
}

/// State for the authorization middleware.
#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<TokenVerifier>,
    pub enforcer: Arc<PolicyEnforcer>,
    /// Realm named in `WWW-Authenticate` challenges.
    pub realm: Arc<str>,
    pub mode: AuthMode,
}

/// Path the client requested, before any `Router::nest` prefix stripping.
fn resource_path(req: &Request) -> String {
    req.extensions()
        .get::<OriginalUri>()
        .map_or_else(|| req.uri().path(), |uri| uri.0.path())
        .to_string()
}

/// Authorization middleware.
///
/// # Response
///
/// - No token: 401 challenge in `Required` mode, anonymous subject in `Optional` mode
/// - Invalid token: 401 with a `WWW-Authenticate: JWT realm="..."` challenge
/// - Policy denies: 403
/// - Keys unavailable: 503
#[instrument(skip_all, name = "gateway.middleware.auth", fields(method = %req.method(), path))]
pub async fn authorize(State(state): State<Arc<AuthState>>, mut req: Request, next: Next) -> Response {
    let path = resource_path(&req);
    tracing::Span::current().record("path", path.as_str());

    let claims = match state.verifier.verify_request(req.headers(), req.uri()).await {
        Ok(claims) => Some(claims),
        Err(AuthError::NoToken) if state.mode == AuthMode::Optional => {
            tracing::debug!(target: "gateway.middleware.auth", "No token, evaluating as anonymous");
            None
        }
        Err(e) => return e.into_response_with_realm(&state.realm),
    };

    let subject = claims.as_ref().and_then(Claims::subject).unwrap_or_default();
    if !state.enforcer.decide(subject, &path, req.method().as_str()) {
        return AuthError::Forbidden("Access denied".to_string())
            .into_response_with_realm(&state.realm);
    }

    if let Some(claims) = claims {
        req.extensions_mut().insert(claims);
    }

    next.run(req).await.into_response()
}

/// Access to verified claims from a handler.
pub trait ClaimsExt {
    /// `None` for anonymous requests or routes without the middleware.
    fn claims(&self) -> Option<&Claims>;
}

impl<B> ClaimsExt for axum::http::Request<B> {
    fn claims(&self) -> Option<&Claims> {
        self.extensions().get::<Claims>()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AuthState>();
    }

    #[test]
    fn test_resource_path_prefers_original_uri() {
        let mut req = Request::builder()
            .uri("/v1/content/7")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(resource_path(&req), "/v1/content/7");

        req.extensions_mut()
            .insert(OriginalUri("/api/v1/content/7?x=1".parse().unwrap()));
        assert_eq!(resource_path(&req), "/api/v1/content/7");
    }

    #[test]
    fn test_claims_ext_reads_extensions() {
        let mut req = axum::http::Request::new(());
        assert!(req.claims().is_none());

        req.extensions_mut().insert(Claims {
            sub: Some("u1".to_string()),
            ..Claims::default()
        });
        assert_eq!(req.claims().unwrap().subject(), Some("u1"));
    }
}
