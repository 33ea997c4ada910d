//! Gateway endpoints under `/_`: health, readiness, version. Never subject to the access gate.

use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    store: &'static str,
    open_databases: usize,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn ready(State(state): State<AppState>) -> Result<Json<ReadyBody>, (axum::http::StatusCode, Json<ReadyBody>)> {
    let open_databases = state.registry.open_databases().len();
    if let Err(e) = state.registry.connector().ping().await {
        tracing::warn!(error = %e, "store ping failed");
        return Err((
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "degraded",
                store: "unavailable",
                open_databases,
            }),
        ));
    }
    Ok(Json(ReadyBody {
        status: "ok",
        store: "ok",
        open_databases,
    }))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /_health, /_ready (pings the store), /_version.
pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/_health", get(health))
        .route("/_ready", get(ready))
        .route("/_version", get(version))
        .with_state(state)
}
