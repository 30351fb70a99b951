//! API routes

mod admin;
mod proxy;

use axum::{Router, extract::DefaultBodyLimit};
use std::sync::Arc;

use crate::state::{AppState, MetricsHandle};

pub use proxy::{CacheStatus, ProxyMethod, X_CACHE};

/// Largest request body forwarded to a backend (16 MiB)
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Create the proxy router: every path and method lands in the proxy handler
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .fallback(proxy::proxy)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

/// Create the admin router
pub fn create_admin_router(state: AppState, metrics_handle: Option<Arc<MetricsHandle>>) -> Router {
    let mut router = admin::routes().with_state(state);

    if let Some(handle) = metrics_handle {
        router = router.merge(admin::metrics_routes(handle));
    }

    router
}
