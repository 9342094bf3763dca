//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::error::StartupError;
use api::routes::{AppLedger, AppState};
use ledger::{InMemoryLedger, PostgresLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::CircuitBreaker;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve<L: AppLedger>(
    config: &Config,
    ledger: L,
    metrics_handle: PrometheusHandle,
) -> Result<(), StartupError> {
    let breaker = Arc::new(CircuitBreaker::new(config.breaker.clone()));
    let inventory = api::build_inventory(config, breaker.clone())?;
    let state = Arc::new(AppState::new(ledger, inventory, breaker, config.saga_timeout));
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn run(config: Config, metrics_handle: PrometheusHandle) -> Result<(), StartupError> {
    match &config.database_url {
        Some(url) => {
            let ledger = PostgresLedger::connect(url, config.database_max_connections).await?;
            ledger.run_migrations().await?;
            tracing::info!("using PostgreSQL ledger");
            serve(&config, ledger, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory ledger");
            serve(&config, InMemoryLedger::new(), metrics_handle).await
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire ledger, inventory and routes, then serve
    if let Err(e) = run(config, metrics_handle).await {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }

    tracing::info!("server shut down gracefully");
}
