use std::net::SocketAddr;

use anyhow::Context;

use admin_api_rust::{config, router, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize configuration (this loads the config singleton and .env)
    let config = config::config().context("refusing to start with invalid configuration")?;
    startup::init_tracing(config.environment);
    tracing::info!("Starting Admin API in {:?} mode", config.environment);

    config.validate().context("refusing to start with invalid configuration")?;

    let state = startup::init(config).await.context("failed to initialize stores")?;
    let app = router(state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Admin API listening on http://{}", bind_addr);

    // Peer addresses feed the audit trail's ipAddress
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")?;
    Ok(())
}
