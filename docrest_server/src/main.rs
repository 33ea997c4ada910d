//! docrest server: loads config (`config.json`, `.env`, `DOCREST_*`), serves the gateway over
//! PostgreSQL, and closes every database pool on Ctrl-C.
//!
//! Run from repo root: `cargo run -p docrest-server`
//! Pass a config path as the first argument to override `./config.json`.

use docrest::{app, load_config, AppState, PgConnector};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path.as_deref())?;

    let default_directive = if config.debug { "docrest=debug" } else { "docrest=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive)),
        )
        .init();

    let connector = Arc::new(PgConnector::new(config.store.clone()));
    let addr = format!("{}:{}", config.server.address, config.server.port);
    let state = AppState::new(connector, config);
    let registry = state.registry.clone();

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("docrest listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.close_all().await;
    tracing::info!("all database handles closed");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
