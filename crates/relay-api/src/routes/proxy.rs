//! Catch-all proxy handler
//!
//! GET requests go through the response cache, POST requests are forwarded
//! untouched, every other method is rejected. Each response carries an
//! `X-Cache` marker.

use axum::{
    body::Body,
    extract::{FromRequest, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::Utc;
use relay_core::{CachedResponse, Lookup, cache_key};
use relay_proxy::{BackendResponse, ProxyError};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Response header reporting how the cache handled the request
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Request methods the proxy distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMethod {
    Get,
    Post,
    Other,
}

impl From<&Method> for ProxyMethod {
    fn from(method: &Method) -> Self {
        match *method {
            Method::GET => ProxyMethod::Get,
            Method::POST => ProxyMethod::Post,
            _ => ProxyMethod::Other,
        }
    }
}

/// Value of the `X-Cache` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Caching never applies (POST, rejected methods)
    NotApplicable,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::NotApplicable => "N/A",
        }
    }

    fn header_value(&self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

/// Fallback handler for every inbound request
///
/// The request body is only buffered for POST, so oversized bodies on other
/// methods never reach the body limit.
pub async fn proxy(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();
    debug!("Received request: {} {}", parts.method, path);

    let (result, marker) = match ProxyMethod::from(&parts.method) {
        ProxyMethod::Get => (
            handle_get(&state, &path, &parts.headers).await,
            CacheStatus::Miss,
        ),
        ProxyMethod::Post => (
            handle_post(&state, &path, Request::from_parts(parts, body)).await,
            CacheStatus::NotApplicable,
        ),
        ProxyMethod::Other => (Err(ApiError::MethodNotAllowed), CacheStatus::NotApplicable),
    };

    let mut response = result.unwrap_or_else(IntoResponse::into_response);
    response
        .headers_mut()
        .entry(X_CACHE)
        .or_insert_with(|| marker.header_value());
    response
}

async fn handle_get(state: &AppState, path: &str, headers: &HeaderMap) -> Result<Response, ApiError> {
    let key = cache_key(path);
    let decision = state.policy.pre_fetch(headers);

    if decision.use_cache {
        match state.cache.lookup(&key, Utc::now()) {
            Lookup::Hit(cached) => {
                debug!("Cache HIT for {}", path);
                metrics::counter!("relay_cache_hits_total").increment(1);
                return Ok(replay(&cached));
            }
            Lookup::Expired => {
                debug!("Cache EXPIRED for {}", path);
                metrics::counter!("relay_cache_misses_total", "reason" => "expired").increment(1);
            }
            Lookup::Miss => {
                debug!("Cache MISS for {}", path);
                metrics::counter!("relay_cache_misses_total", "reason" => "absent").increment(1);
            }
        }
    } else {
        debug!("Cache BYPASSED for {}", path);
        metrics::counter!("relay_cache_bypass_total").increment(1);
    }

    let response = forward(state, path, |url| async move { state.client.get(&url).await }).await?;

    let storage = state.policy.post_fetch(&response.headers, decision.client_max_age);
    if let Some(max_age) = state.policy.storable(decision, response.status, storage) {
        let now = Utc::now();
        let expires_at = state.policy.expires_at(now, max_age);
        state.cache.store(
            key,
            CachedResponse::new(
                response.status,
                response.body.clone(),
                response.headers.clone(),
                now,
                expires_at,
            ),
        );
        metrics::counter!("relay_cache_stores_total").increment(1);
        debug!("Cached response for {} until {}", path, expires_at);
    }

    Ok(mirror(response, CacheStatus::Miss))
}

async fn handle_post(state: &AppState, path: &str, request: Request) -> Result<Response, ApiError> {
    let content_type = request.headers().get(header::CONTENT_TYPE).cloned();
    let body = Bytes::from_request(request, state).await?;

    let response = forward(state, path, |url| async move {
        state.client.post(&url, content_type.as_ref(), body).await
    })
    .await?;

    Ok(mirror(response, CacheStatus::NotApplicable))
}

/// Pick the next backend and run `call` against `backend_url + path`
async fn forward<F, Fut>(state: &AppState, path: &str, call: F) -> Result<BackendResponse, ApiError>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<BackendResponse, ProxyError>>,
{
    let backend = state.pool.next();
    let base_url = backend.base_url();
    debug!("Using backend {}", base_url);
    metrics::counter!("relay_backend_requests_total", "backend" => base_url.clone()).increment(1);

    let url = format!("{}{}", base_url, path);
    call(url).await.map_err(|e| {
        warn!("Backend {} failed for {}: {}", base_url, path, e);
        metrics::counter!("relay_backend_errors_total", "kind" => e.kind()).increment(1);
        ApiError::Backend(e)
    })
}

/// Serve a stored response with `X-Cache: HIT` and a synthesized `Age`
fn replay(cached: &CachedResponse) -> Response {
    let mut response = Response::new(Body::from(cached.body.clone()));
    *response.status_mut() = cached.status;
    *response.headers_mut() = cached.headers.clone();

    let headers = response.headers_mut();
    headers.insert(X_CACHE, CacheStatus::Hit.header_value());
    headers.insert(header::AGE, HeaderValue::from(cached.age_secs(Utc::now())));
    response
}

/// Mirror a backend response back to the caller
fn mirror(backend: BackendResponse, marker: CacheStatus) -> Response {
    let mut response = Response::new(Body::from(backend.body));
    *response.status_mut() = backend.status;
    *response.headers_mut() = backend.headers;
    response.headers_mut().insert(X_CACHE, marker.header_value());
    response
}
