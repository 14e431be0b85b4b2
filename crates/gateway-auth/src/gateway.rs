//! Composed gateway auth layer.
//!
//! `GatewayAuth` wires configuration into the key provider, verifier,
//! optional issuer, replication client, enforcer and reload task, and hands
//! out the pieces a service router needs.

use crate::config::GatewayAuthConfig;
use crate::errors::AuthError;
use crate::handlers::{handle_get_jwks, JWKS_PATH};
use crate::middleware::{authorize, AuthMode, AuthState};
use crate::policy::{
    AutoReloadScheduler, GrpcPolicyAdapter, PolicyEnforcer, ReloadSchedule,
};
use crate::token::{KeyMaterialProvider, RemoteJwksProvider, TokenIssuer, TokenVerifier};
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Authentication and authorization for one gateway.
pub struct GatewayAuth {
    verifier: Arc<TokenVerifier>,
    issuer: Option<Arc<TokenIssuer>>,
    enforcer: Arc<PolicyEnforcer>,
    scheduler: AutoReloadScheduler,
    realm: Arc<str>,
}

impl GatewayAuth {
    /// Build every component and load the policy.
    ///
    /// # Errors
    ///
    /// - `Config` for an unusable signing key or JWKS URL
    /// - `Policy` when the policy service endpoint is invalid or the first
    ///   load fails
    pub async fn from_config(config: &GatewayAuthConfig) -> Result<Self, AuthError> {
        let issuer = config
            .issuer_config()
            .map(TokenIssuer::new)
            .transpose()?
            .map(Arc::new);

        let keys: Arc<dyn KeyMaterialProvider> = match (&config.jwks_url, &issuer) {
            (Some(url), _) => Arc::new(RemoteJwksProvider::new(url, config.jwks_cache_ttl)?),
            (None, Some(issuer)) => Arc::new(issuer.key_provider()),
            (None, None) => {
                return Err(AuthError::Config(
                    "no signing key or JWKS URL configured".to_string(),
                ))
            }
        };
        let verifier = Arc::new(TokenVerifier::new(config.verifier_config(), keys));

        let adapter = Arc::new(GrpcPolicyAdapter::new(config.replication_config())?);
        let enforcer = PolicyEnforcer::initialize(adapter, config.enforcer_config()).await?;

        tracing::info!(
            target: "gateway.auth",
            realm = %config.realm,
            lookup = %config.token_lookup,
            issuer_enabled = issuer.is_some(),
            remote_keys = config.jwks_url.is_some(),
            "Gateway auth initialized"
        );

        Ok(Self::with_components(
            verifier,
            issuer,
            enforcer,
            config.reload_schedule(),
            &config.realm,
        ))
    }

    /// Assemble from prebuilt parts and start the reload task.
    #[must_use]
    pub fn with_components(
        verifier: Arc<TokenVerifier>,
        issuer: Option<Arc<TokenIssuer>>,
        enforcer: Arc<PolicyEnforcer>,
        schedule: ReloadSchedule,
        realm: &str,
    ) -> Self {
        let scheduler =
            AutoReloadScheduler::spawn(Arc::clone(&enforcer), schedule, CancellationToken::new());

        Self {
            verifier,
            issuer,
            enforcer,
            scheduler,
            realm: Arc::from(realm),
        }
    }

    #[must_use]
    pub fn verifier(&self) -> &Arc<TokenVerifier> {
        &self.verifier
    }

    #[must_use]
    pub fn issuer(&self) -> Option<&Arc<TokenIssuer>> {
        self.issuer.as_ref()
    }

    #[must_use]
    pub fn enforcer(&self) -> &Arc<PolicyEnforcer> {
        &self.enforcer
    }

    #[must_use]
    pub fn auth_state(&self, mode: AuthMode) -> Arc<AuthState> {
        Arc::new(AuthState {
            verifier: Arc::clone(&self.verifier),
            enforcer: Arc::clone(&self.enforcer),
            realm: Arc::clone(&self.realm),
            mode,
        })
    }

    /// Put every route of `router` behind the authorization middleware.
    /// Requests without a token get a 401 challenge.
    pub fn protect<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route_layer(middleware::from_fn_with_state(
            self.auth_state(AuthMode::Required),
            authorize,
        ))
    }

    /// Like [`Self::protect`], but requests without a token are decided by
    /// policy as the anonymous subject.
    pub fn protect_optional<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route_layer(middleware::from_fn_with_state(
            self.auth_state(AuthMode::Optional),
            authorize,
        ))
    }

    /// `GET /.well-known/jwks.json` when this gateway issues tokens.
    #[must_use]
    pub fn jwks_routes(&self) -> Option<Router> {
        self.issuer.as_ref().map(|issuer| {
            Router::new()
                .route(JWKS_PATH, get(handle_get_jwks))
                .with_state(Arc::clone(issuer))
        })
    }

    /// Stop the reload task.
    pub async fn shutdown(self) {
        tracing::info!(target: "gateway.auth", "Shutting down gateway auth");
        self.scheduler.shutdown().await;
    }
}
