//! One-time process startup: tracing, stores, verifier and audit recorder.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::app::AppState;
use crate::config::{AppConfig, Environment};
use crate::database::{MemoryStore, PgStore, StoreError};

static STATE: OnceCell<AppState> = OnceCell::const_new();

/// Build the shared state once. Later calls return the same state; the
/// `config` passed to them is ignored.
pub async fn init(config: &AppConfig) -> Result<&'static AppState, StoreError> {
    if let Some(state) = STATE.get() {
        debug!("Startup already complete, reusing initialized state");
        return Ok(state);
    }

    STATE.get_or_try_init(|| build_state(config.clone())).await
}

/// The initialized state, if [`init`] has completed.
pub fn state() -> Option<&'static AppState> {
    STATE.get()
}

async fn build_state(config: AppConfig) -> Result<AppState, StoreError> {
    let state = match config.database.url.clone() {
        Some(url) => {
            let store = PgStore::connect(&config.database, &url).await?;
            info!("Using Postgres document and audit store");
            AppState::with_jwt(config, Arc::new(store.clone()), Arc::new(store))
        }
        None => {
            info!("DATABASE_URL not set, using in-memory store");
            let store = MemoryStore::new();
            AppState::with_jwt(config, Arc::new(store.clone()), Arc::new(store))
        }
    };

    Ok(state)
}

/// Install the global fmt subscriber. `RUST_LOG` wins over the per-environment
/// default. Safe to call more than once.
pub fn init_tracing(environment: Environment) {
    let default = match environment {
        Environment::Development => "info,admin_api_rust=debug,audit=debug",
        Environment::Staging | Environment::Production => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
