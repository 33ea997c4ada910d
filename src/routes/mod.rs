//! Router assembly.

mod common;
mod gateway;

pub use common::common_routes;
pub use gateway::gateway_routes;

use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Full application: gateway endpoints, the resource hierarchy, body limit and request tracing.
/// The limit is enforced by the body extractor so oversized bodies get the JSON error envelope.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(gateway_routes(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
}
