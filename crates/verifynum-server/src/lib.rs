//! VerifyNum Server - balance ledger and payment reconciliation
//!
//! Credits top-ups exactly once per paid checkout, no matter how often the
//! provider redelivers its webhook or how the buyer's verify calls race it.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod provider;
pub mod reconcile;
pub mod routes;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::AppError;
pub use routes::create_router;
pub use state::AppState;

/// Initialize tracing subscriber for structured logging
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verifynum_server=debug,tower_http=info,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
