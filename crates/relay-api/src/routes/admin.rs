//! Admin endpoints: health, metrics, cache and backend inspection
//!
//! Served on their own listener since the proxy owns every path of the
//! main one.

use axum::{
    Json, Router,
    extract::State,
    routing::{delete, get},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::state::{AppState, MetricsHandle};

/// Health status response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Cache statistics response
#[derive(Serialize)]
pub struct CacheStatsResponse {
    pub enabled: bool,
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

#[derive(Serialize)]
pub struct ClearCacheResponse {
    pub cleared: usize,
}

#[derive(Serialize)]
pub struct BackendResponse {
    pub url: String,
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// GET /health, /healthz
async fn health() -> Json<HealthResponse> {
    metrics::counter!("relay_health_checks_total").increment(1);

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/v1/cache/stats
async fn cache_stats(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    let stats = state.cache.stats();

    Json(CacheStatsResponse {
        enabled: state.policy.is_enabled(),
        entries: stats.entries,
        capacity: stats.capacity,
        hits: stats.hits,
        misses: stats.misses,
        expired: stats.expired,
        evictions: stats.evictions,
        hit_rate: stats.hit_rate(),
    })
}

/// DELETE /api/v1/cache
async fn clear_cache(State(state): State<AppState>) -> Json<ClearCacheResponse> {
    info!("Clearing response cache via admin API");
    let cleared = state.cache.clear();
    Json(ClearCacheResponse { cleared })
}

/// GET /api/v1/backends - backends in rotation order
async fn list_backends(State(state): State<AppState>) -> Json<Vec<BackendResponse>> {
    let backends = state
        .pool
        .backends()
        .iter()
        .map(|b| BackendResponse {
            url: b.base_url(),
            host: b.host.clone(),
            port: b.port,
            tls: b.tls,
        })
        .collect();

    Json(backends)
}

/// Create admin routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/api/v1/cache/stats", get(cache_stats))
        .route("/api/v1/cache", delete(clear_cache))
        .route("/api/v1/backends", get(list_backends))
}

/// GET /metrics - Prometheus text exposition
async fn render_metrics(State(handle): State<Arc<MetricsHandle>>) -> String {
    handle.render()
}

/// Prometheus scrape route, stateful on the recorder handle
pub fn metrics_routes(handle: Arc<MetricsHandle>) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(handle)
}
