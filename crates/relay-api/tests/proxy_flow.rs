use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use bytes::Bytes;
use relay_api::{AppState, create_admin_router, create_router};
use relay_core::{BackendDescriptor, BackendPool, CachePolicy, ResponseCache, cache_key};
use relay_proxy::{BackendClient, BackendClientConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::ServiceExt;
use wiremock::matchers::{body_string, header as header_eq, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestProxy {
    router: Router,
    state: AppState,
}

fn descriptor(server: &MockServer) -> BackendDescriptor {
    let addr = server.address();
    BackendDescriptor::new(addr.ip().to_string(), addr.port())
}

fn build_proxy(backends: Vec<BackendDescriptor>, capacity: usize, enabled: bool) -> TestProxy {
    build_proxy_with_timeout(backends, capacity, enabled, Duration::from_secs(5))
}

fn build_proxy_with_timeout(
    backends: Vec<BackendDescriptor>,
    capacity: usize,
    enabled: bool,
    timeout: Duration,
) -> TestProxy {
    let client = BackendClient::new(BackendClientConfig {
        timeout: Some(timeout),
        connect_timeout: Some(Duration::from_secs(1)),
    })
    .unwrap();

    let state = AppState::new(
        Arc::new(ResponseCache::new(capacity).unwrap()),
        CachePolicy::new(enabled),
        Arc::new(BackendPool::new(backends).unwrap()),
        client,
    );

    TestProxy {
        router: create_router(state.clone()),
        state,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_with(uri: &str, name: &str, value: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(name, value)
        .body(Body::empty())
        .unwrap()
}

fn x_cache(headers: &HeaderMap) -> &str {
    headers.get("x-cache").unwrap().to_str().unwrap()
}

async fn mount_body(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-origin", "mock")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

async fn hits_for(servers: &[&MockServer], route: &str) -> usize {
    let mut count = 0;
    for server in servers {
        count += server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == route)
            .count();
    }
    count
}

#[tokio::test]
async fn test_cache_hit_then_lru_eviction() {
    let b0 = MockServer::start().await;
    let b1 = MockServer::start().await;
    for server in [&b0, &b1] {
        mount_body(server, "/a", "body-a").await;
        mount_body(server, "/b", "body-b").await;
        mount_body(server, "/c", "body-c").await;
    }

    let proxy = build_proxy(vec![descriptor(&b0), descriptor(&b1)], 2, true);

    let (status, headers, body) = send(&proxy.router, get("/a")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(x_cache(&headers), "MISS");
    assert_eq!(body, "body-a");

    // Stored with the long default horizon
    let cached = proxy.state.cache.peek(&cache_key("/a")).unwrap();
    assert_eq!(cached.lifetime_secs(), relay_core::DEFAULT_HORIZON_SECS);

    let (status, headers, body) = send(&proxy.router, get("/a")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(x_cache(&headers), "HIT");
    assert_eq!(body, "body-a");
    assert_eq!(headers.get("x-origin").unwrap(), "mock");
    assert!(headers.get(header::AGE).is_some());
    assert_eq!(hits_for(&[&b0, &b1], "/a").await, 1);

    let (_, headers, _) = send(&proxy.router, get("/b")).await;
    assert_eq!(x_cache(&headers), "MISS");
    let (_, headers, _) = send(&proxy.router, get("/c")).await;
    assert_eq!(x_cache(&headers), "MISS");

    let (status, headers, body) = send(&proxy.router, get("/a")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(x_cache(&headers), "MISS");
    assert_eq!(body, "body-a");
    assert_eq!(hits_for(&[&b0, &b1], "/a").await, 2);
}

#[tokio::test]
async fn test_post_round_robin_forwarding() {
    let b0 = MockServer::start().await;
    let b1 = MockServer::start().await;
    for (server, name) in [(&b0, "zero"), (&b1, "one")] {
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(header_eq("content-type", "application/json"))
            .and(body_string(r#"{"qty":2}"#))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("location", "/orders/7")
                    .set_body_string(name),
            )
            .mount(server)
            .await;
    }

    let proxy = build_proxy(vec![descriptor(&b0), descriptor(&b1)], 4, true);

    let mut bodies = Vec::new();
    for _ in 0..3 {
        let request = Request::builder()
            .method("POST")
            .uri("/orders")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"qty":2}"#))
            .unwrap();
        let (status, headers, body) = send(&proxy.router, request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(x_cache(&headers), "N/A");
        assert_eq!(headers.get(header::LOCATION).unwrap(), "/orders/7");
        bodies.push(body);
    }

    assert_eq!(bodies, vec!["zero", "one", "zero"]);
    assert!(proxy.state.cache.is_empty());
}

#[tokio::test]
async fn test_client_no_store_bypasses_cache() {
    let backend = MockServer::start().await;
    mount_body(&backend, "/fresh", "fresh").await;
    let proxy = build_proxy(vec![descriptor(&backend)], 4, true);

    // Prime the cache, then bypass it
    send(&proxy.router, get("/fresh")).await;
    for _ in 0..2 {
        let (_, headers, body) =
            send(&proxy.router, get_with("/fresh", "cache-control", "no-store")).await;
        assert_eq!(x_cache(&headers), "MISS");
        assert_eq!(body, "fresh");
    }
    assert_eq!(hits_for(&[&backend], "/fresh").await, 3);

    let (_, headers, _) = send(&proxy.router, get_with("/fresh", "pragma", "no-cache")).await;
    assert_eq!(x_cache(&headers), "MISS");
    let (_, headers, _) = send(&proxy.router, get("/fresh")).await;
    assert_eq!(x_cache(&headers), "HIT");
}

#[tokio::test]
async fn test_bypassed_request_does_not_populate_cache() {
    let backend = MockServer::start().await;
    mount_body(&backend, "/x", "x").await;
    let proxy = build_proxy(vec![descriptor(&backend)], 4, true);

    send(&proxy.router, get_with("/x", "cache-control", "no-cache")).await;
    assert!(proxy.state.cache.is_empty());
}

#[tokio::test]
async fn test_origin_no_store_forbids_storage() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", "no-store")
                .set_body_string("secret"),
        )
        .expect(2)
        .mount(&backend)
        .await;

    let proxy = build_proxy(vec![descriptor(&backend)], 4, true);

    for _ in 0..2 {
        let (_, headers, body) =
            send(&proxy.router, get_with("/private", "cache-control", "max-age=600")).await;
        assert_eq!(x_cache(&headers), "MISS");
        assert_eq!(body, "secret");
    }
    assert!(proxy.state.cache.is_empty());
}

#[tokio::test]
async fn test_max_age_resolution_sets_expiry() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", "public, max-age=60")
                .set_body_string("ok"),
        )
        .mount(&backend)
        .await;

    let proxy = build_proxy(vec![descriptor(&backend)], 4, true);

    send(&proxy.router, get("/origin-ttl")).await;
    let cached = proxy.state.cache.peek(&cache_key("/origin-ttl")).unwrap();
    assert_eq!(cached.lifetime_secs(), 60);

    send(&proxy.router, get_with("/client-ttl", "cache-control", "max-age=15")).await;
    let cached = proxy.state.cache.peek(&cache_key("/client-ttl")).unwrap();
    assert_eq!(cached.lifetime_secs(), 15);
}

#[tokio::test]
async fn test_non_ok_responses_are_not_cached() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .expect(2)
        .mount(&backend)
        .await;

    let proxy = build_proxy(vec![descriptor(&backend)], 4, true);

    for _ in 0..2 {
        let (status, headers, body) = send(&proxy.router, get("/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(x_cache(&headers), "MISS");
        assert_eq!(body, "nope");
    }
}

#[tokio::test]
async fn test_cache_disabled_always_forwards() {
    let backend = MockServer::start().await;
    mount_body(&backend, "/page", "page").await;
    let proxy = build_proxy(vec![descriptor(&backend)], 4, false);

    for _ in 0..3 {
        let (_, headers, _) = send(&proxy.router, get("/page")).await;
        assert_eq!(x_cache(&headers), "MISS");
    }
    assert_eq!(hits_for(&[&backend], "/page").await, 3);
    assert!(proxy.state.cache.is_empty());
}

#[tokio::test]
async fn test_query_string_shares_path_key() {
    let backend = MockServer::start().await;
    mount_body(&backend, "/search", "first").await;
    let proxy = build_proxy(vec![descriptor(&backend)], 4, true);

    let (_, headers, body) = send(&proxy.router, get("/search?q=one")).await;
    assert_eq!(x_cache(&headers), "MISS");
    assert_eq!(body, "first");

    let (_, headers, body) = send(&proxy.router, get("/search?q=two")).await;
    assert_eq!(x_cache(&headers), "HIT");
    assert_eq!(body, "first");

    let requests = backend.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.query(), None);
}

#[tokio::test]
async fn test_unsupported_method_rejected_without_backend_call() {
    let backend = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&backend)
        .await;

    let proxy = build_proxy(vec![descriptor(&backend)], 4, true);

    for verb in ["PUT", "DELETE", "PATCH"] {
        let request = Request::builder()
            .method(verb)
            .uri("/resource")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(&proxy.router, request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(x_cache(&headers), "N/A");
        assert_eq!(headers.get(header::ALLOW).unwrap(), "GET, POST");
    }
}

/// Larger than the 16 MiB body limit
fn oversized_body() -> Body {
    Body::from(vec![b'x'; 17 * 1024 * 1024])
}

#[tokio::test]
async fn test_oversized_body_only_limits_post() {
    let backend = MockServer::start().await;
    mount_body(&backend, "/upload", "listing").await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&backend)
        .await;

    let proxy = build_proxy(vec![descriptor(&backend)], 4, true);

    let request = Request::builder()
        .method("PUT")
        .uri("/upload")
        .body(oversized_body())
        .unwrap();
    let (status, headers, _) = send(&proxy.router, request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(x_cache(&headers), "N/A");

    let request = Request::builder()
        .uri("/upload")
        .body(oversized_body())
        .unwrap();
    let (status, headers, body) = send(&proxy.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(x_cache(&headers), "MISS");
    assert_eq!(body, "listing");

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .body(oversized_body())
        .unwrap();
    let (status, headers, _) = send(&proxy.router, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(x_cache(&headers), "N/A");
}

/// Backend that promises a 100 byte body, sends 5 bytes and hangs up
async fn truncating_backend() -> BackendDescriptor {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 100\r\n\r\nshort",
                    )
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });

    BackendDescriptor::new(addr.ip().to_string(), addr.port())
}

#[tokio::test]
async fn test_truncated_backend_body_is_internal_error() {
    let proxy = build_proxy(vec![truncating_backend().await], 4, true);

    let (status, headers, _) = send(&proxy.router, get("/partial")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(x_cache(&headers), "MISS");
    assert!(proxy.state.cache.is_empty());
    assert!(proxy.state.cache.peek(&cache_key("/partial")).is_none());

    let request = Request::builder()
        .method("POST")
        .uri("/partial")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("payload"))
        .unwrap();
    let (status, headers, _) = send(&proxy.router, request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(x_cache(&headers), "N/A");
    assert!(proxy.state.cache.is_empty());
}

#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let proxy = build_proxy(vec![BackendDescriptor::new("127.0.0.1", port)], 4, true);

    let (status, headers, _) = send(&proxy.router, get("/down")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(x_cache(&headers), "MISS");

    let request = Request::builder()
        .method("POST")
        .uri("/down")
        .body(Body::from("x"))
        .unwrap();
    let (status, headers, _) = send(&proxy.router, request).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(x_cache(&headers), "N/A");
    assert!(proxy.state.cache.is_empty());
}

#[tokio::test]
async fn test_slow_backend_is_gateway_timeout() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&backend)
        .await;

    let proxy = build_proxy_with_timeout(
        vec![descriptor(&backend)],
        4,
        true,
        Duration::from_millis(200),
    );

    let (status, headers, _) = send(&proxy.router, get("/slow")).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(x_cache(&headers), "MISS");
    assert!(proxy.state.cache.is_empty());
}

#[tokio::test]
async fn test_admin_stats_and_clear() {
    let backend = MockServer::start().await;
    mount_body(&backend, "/s", "s").await;
    let proxy = build_proxy(vec![descriptor(&backend)], 4, true);
    let admin = create_admin_router(proxy.state.clone(), None);

    send(&proxy.router, get("/s")).await;
    send(&proxy.router, get("/s")).await;

    let (status, _, body) = send(&admin, get("/api/v1/cache/stats")).await;
    assert_eq!(status, StatusCode::OK);
    let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stats["entries"], 1);
    assert_eq!(stats["hits"], 1);
    assert_eq!(stats["misses"], 1);
    assert_eq!(stats["enabled"], true);

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/v1/cache")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&admin, request).await;
    assert_eq!(status, StatusCode::OK);
    let cleared: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(cleared["cleared"], 1);
    assert!(proxy.state.cache.is_empty());

    let (status, _, body) = send(&admin, get("/api/v1/backends")).await;
    assert_eq!(status, StatusCode::OK);
    let backends: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(backends.as_array().unwrap().len(), 1);

    let (status, _, _) = send(&admin, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}
