//! Access-control gate consulted before routing. A gate either lets the request through or
//! rejects it with 401/403.

use crate::config::AccessControlConfig;
use crate::error::AppError;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::sync::Arc;

pub trait AccessGate: Send + Sync {
    fn check(&self, method: &Method, headers: &HeaderMap) -> Result<(), AppError>;
}

/// API keys from a request header. Read-only keys may issue GET and HEAD only.
pub struct ApiKeyGate {
    header: String,
    keys: HashSet<String>,
    read_only_keys: HashSet<String>,
}

impl ApiKeyGate {
    pub fn from_config(config: &AccessControlConfig) -> Self {
        ApiKeyGate {
            header: config.header.clone(),
            keys: config.keys.iter().cloned().collect(),
            read_only_keys: config.read_only_keys.iter().cloned().collect(),
        }
    }
}

impl AccessGate for ApiKeyGate {
    fn check(&self, method: &Method, headers: &HeaderMap) -> Result<(), AppError> {
        let key = headers
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", self.header)))?;
        if self.keys.contains(key) {
            return Ok(());
        }
        if self.read_only_keys.contains(key) {
            return if *method == Method::GET || *method == Method::HEAD {
                Ok(())
            } else {
                Err(AppError::Forbidden(format!("read-only key cannot {}", method)))
            };
        }
        Err(AppError::Unauthorized("unknown API key".into()))
    }
}

/// Middleware running the gate; mount with `axum::middleware::from_fn_with_state`.
pub async fn access_control(
    State(gate): State<Arc<dyn AccessGate>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    gate.check(request.method(), request.headers())?;
    Ok(next.run(request).await)
}
