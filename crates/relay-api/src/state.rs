//! Application state

use relay_core::{BackendPool, CachePolicy, ResponseCache};
use relay_proxy::BackendClient;
use std::sync::Arc;

/// Prometheus handle rendered by the admin `/metrics` route
pub type MetricsHandle = metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ResponseCache>,
    pub policy: Arc<CachePolicy>,
    pub pool: Arc<BackendPool>,
    pub client: BackendClient,
}

impl AppState {
    pub fn new(
        cache: Arc<ResponseCache>,
        policy: CachePolicy,
        pool: Arc<BackendPool>,
        client: BackendClient,
    ) -> Self {
        Self {
            cache,
            policy: Arc::new(policy),
            pool,
            client,
        }
    }
}
