//! Policy Service
//!
//! Serves the authoritative authorization rules to gateways over gRPC.

use axum::{routing::get, Router};
use common::policy::PolicyRule;
use common::secret::ExposeSecret;
use policy_service::config::{Config, StoreBackend};
use policy_service::observability::init_metrics_recorder;
use policy_service::store::{load_seed_file, seed_if_empty};
use policy_service::{InMemoryPolicyStore, PgPolicyStore, PolicyReplicationService, PolicyStore};
use proto_gen::policy::policy_replication_server::PolicyReplicationServer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "policy_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Policy Service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        store = ?config.store,
        grpc_bind_address = %config.grpc_bind_address,
        seeded = config.seed_file.is_some(),
        "Configuration loaded successfully"
    );

    // Parse the seed before touching the store so a bad file fails startup
    let seed = match &config.seed_file {
        Some(path) => Some(load_seed_file(path).await.map_err(|e| {
            error!("Failed to load seed rules: {}", e);
            e
        })?),
        None => None,
    };

    let shutdown = CancellationToken::new();

    if let Some(addr) = config.metrics_bind_address {
        start_metrics_server(addr, shutdown.child_token()).await?;
    }

    match config.store {
        StoreBackend::Memory => {
            warn!("Using in-memory policy store, rules are lost on restart");
            serve(Arc::new(InMemoryPolicyStore::new()), &config, seed, shutdown).await?;
        }
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres store"))?;

            info!("Connecting to database...");
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(20)
                .min_connections(2)
                .acquire_timeout(Duration::from_secs(5))
                .idle_timeout(Duration::from_secs(600))
                .max_lifetime(Duration::from_secs(1800))
                .connect(&add_query_timeout(database_url.expose_secret(), 5))
                .await
                .map_err(|e| {
                    error!("Failed to connect to database: {}", e);
                    e
                })?;
            info!("Database connection established");

            sqlx::migrate!("../../migrations").run(&pool).await?;

            serve(Arc::new(PgPolicyStore::new(pool)), &config, seed, shutdown).await?;
        }
    }

    info!("Policy Service shutdown complete");

    Ok(())
}

/// Seed the store and run the gRPC server until shutdown.
async fn serve<S: PolicyStore>(
    store: Arc<S>,
    config: &Config,
    seed: Option<Vec<PolicyRule>>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    if let Some(rules) = seed {
        seed_if_empty(store.as_ref(), &rules).await?;
    }

    let service = PolicyReplicationService::new(store);
    let addr = config.grpc_bind_address;
    let drain_period = config.drain_period;

    info!(addr = %addr, "gRPC server starting");
    tonic::transport::Server::builder()
        .add_service(PolicyReplicationServer::new(service))
        .serve_with_shutdown(addr, async move {
            shutdown_signal(drain_period).await;
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

/// Serve `/metrics` on `addr` until `token` is cancelled.
async fn start_metrics_server(addr: SocketAddr, token: CancellationToken) -> anyhow::Result<()> {
    let handle = init_metrics_recorder().map_err(anyhow::Error::msg)?;

    let app = Router::new()
        .route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        )
        .layer(TraceLayer::new_for_http());

    // Bind before spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind metrics server");
        e
    })?;

    tokio::spawn(async move {
        info!(addr = %addr, "Metrics server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            token.cancelled().await;
        });
        if let Err(e) = server.await {
            error!(error = %e, "Metrics server failed");
        }
    });

    Ok(())
}

/// Waits for SIGINT or SIGTERM, then for the drain period.
async fn shutdown_signal(drain_period: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    if drain_period.is_zero() {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    } else {
        warn!("Draining connections for {} seconds...", drain_period.as_secs());
        tokio::time::sleep(drain_period).await;
        info!("Drain period complete");
    }
}

/// Adds statement_timeout to the database URL.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}options=-c%20statement_timeout%3D{timeout_secs}s")
}
