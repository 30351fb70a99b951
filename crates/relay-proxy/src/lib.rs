//! Relay Backend Client
//!
//! This crate provides the outbound HTTP client used to forward requests
//! to backend applications and buffer their responses.

pub mod client;
pub mod error;

pub use client::{BackendClient, BackendClientConfig, BackendResponse, strip_hop_by_hop};
pub use error::ProxyError;
