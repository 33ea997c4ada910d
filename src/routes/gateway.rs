//! Resource routes. `/` and `/*path` both go to the dispatcher, which resolves the route
//! from segment count and verb.

use crate::access::{access_control, AccessGate, ApiKeyGate};
use crate::handlers::{nested, root};
use crate::state::AppState;
use axum::{middleware, routing::any, Router};
use std::sync::Arc;

pub fn gateway_routes(state: AppState) -> Router {
    let router = Router::new()
        .route("/", any(root))
        .route("/*path", any(nested))
        .with_state(state.clone());
    match &state.config.access_control {
        Some(ac) => {
            let gate: Arc<dyn AccessGate> = Arc::new(ApiKeyGate::from_config(ac));
            router.layer(middleware::from_fn_with_state(gate, access_control))
        }
        None => router,
    }
}
