use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use galilee_db::PgCacheStore;
use galilee_directory::{DirectoryClient, DirectoryConfig};
use galilee_hypervisor::{HypervisorClient, HypervisorConfig};
use galilee_reconcile::{ReconcileConfig, ReconciliationService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use galilee_api::config::ServerConfig;
use galilee_api::router::build_app_router;
use galilee_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "galilee_api=debug,galilee_reconcile=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    let directory_config = DirectoryConfig::from_env().context("Invalid directory configuration")?;
    let hypervisor_config =
        HypervisorConfig::from_env().context("Invalid hypervisor configuration")?;
    let reconcile_config = ReconcileConfig::from_env().context("Invalid sync configuration")?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = galilee_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    galilee_db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    galilee_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Directory / hypervisor ---
    let directory = DirectoryClient::connect(directory_config)
        .await
        .context("Failed to bind to the directory")?;
    tracing::info!(domain = %directory.config().domain, "Directory connection established");

    let hypervisor =
        HypervisorClient::connect(hypervisor_config).context("Failed to build hypervisor client")?;
    tracing::info!(host = %hypervisor.config().host, "Hypervisor client ready");

    // --- App state ---
    let service = ReconciliationService::new(
        directory,
        hypervisor,
        Arc::new(PgCacheStore::new(pool)),
        reconcile_config,
    );
    let state = AppState {
        service: service.clone(),
        config: Arc::new(config.clone()),
    };

    let app = build_app_router(state, &config).context("Invalid CORS origin")?;

    // --- Start server ---
    let host = config
        .host
        .parse::<IpAddr>()
        .with_context(|| format!("Invalid HOST address '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    service.shutdown().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
