//! VerifyNum API server.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use verifynum_server::provider::{PaymentProvider, PolarClient};
use verifynum_server::store::{BalanceStore, MemoryBalanceStore, PgBalanceStore};
use verifynum_server::{create_router, db, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    verifynum_server::init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(environment = ?config.environment, "Starting VerifyNum server");

    let mut listener_handle = None;
    let store: Arc<dyn BalanceStore> = match &config.database {
        Some(database) => {
            let pool = db::create_pool(database)
                .await
                .context("Failed to create database pool")?;
            db::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
            let store = PgBalanceStore::new(pool);
            listener_handle = Some(store.spawn_change_listener());
            tracing::info!("Using PostgreSQL balance store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, balances are kept in memory only");
            Arc::new(MemoryBalanceStore::new())
        }
    };

    let provider: Option<Arc<dyn PaymentProvider>> = match &config.polar.access_token {
        Some(token) => Some(Arc::new(
            PolarClient::new(&config.polar.api_url, token, config.polar.timeout)
                .context("Failed to build Polar client")?,
        )),
        None => {
            tracing::warn!("POLAR_ACCESS_TOKEN not set, checkouts run in development mode");
            None
        }
    };
    if config.polar.webhook_secret.is_none() {
        tracing::warn!("POLAR_WEBHOOK_SECRET not set, webhooks will be rejected");
    }

    let state = AppState::new(&config, store, provider).context("Invalid webhook secret")?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address()))?;
    tracing::info!(address = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(handle) = listener_handle {
        handle.abort();
    }
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
