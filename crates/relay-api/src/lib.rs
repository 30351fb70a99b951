//! Relay HTTP Surface
//!
//! This crate provides the Axum routers for Relay: the catch-all proxy
//! handler that serves from cache or forwards to a backend, and the admin
//! API for health, metrics and cache management.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{CacheStatus, ProxyMethod, X_CACHE, create_admin_router, create_router};
pub use state::{AppState, MetricsHandle};
