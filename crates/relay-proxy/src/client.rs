//! Backend HTTP client

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ProxyError;

/// Headers that describe a single connection and are never forwarded (RFC 7230 §6.1)
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

/// Backend client configuration
#[derive(Clone, Debug)]
pub struct BackendClientConfig {
    /// Deadline for the whole exchange, `None` to wait indefinitely
    pub timeout: Option<Duration>,
    /// Deadline for establishing the connection
    pub connect_timeout: Option<Duration>,
}

impl Default for BackendClientConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// A fully buffered backend response
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    /// Response headers with hop-by-hop headers removed
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// HTTP client shared by every proxied request
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
}

impl BackendClient {
    /// Create a new backend client
    pub fn new(config: BackendClientConfig) -> Result<Self, ProxyError> {
        let mut builder = Client::builder().no_proxy();

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }

        let client = builder.build().map_err(ProxyError::Client)?;

        info!(
            "Created backend client (timeout: {:?}, connect timeout: {:?})",
            config.timeout, config.connect_timeout
        );

        Ok(Self { client })
    }

    /// Issue a GET without forwarding any client headers
    pub async fn get(&self, url: &str) -> Result<BackendResponse, ProxyError> {
        debug!("Calling GET {}", url);
        self.execute(self.client.get(url)).await
    }

    /// Issue a POST carrying the client's body and `Content-Type`
    pub async fn post(
        &self,
        url: &str,
        content_type: Option<&HeaderValue>,
        body: Bytes,
    ) -> Result<BackendResponse, ProxyError> {
        debug!("Calling POST {} ({} bytes)", url, body.len());

        let mut request = self.client.post(url).body(body);
        if let Some(content_type) = content_type {
            request = request.header(header::CONTENT_TYPE, content_type.clone());
        }

        self.execute(request).await
    }

    async fn execute(&self, request: RequestBuilder) -> Result<BackendResponse, ProxyError> {
        let response = request.send().await.map_err(ProxyError::from_send)?;

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);

        let body = response.bytes().await.map_err(ProxyError::from_body)?;

        debug!("Backend responded {} ({} bytes)", status, body.len());

        Ok(BackendResponse {
            status,
            headers,
            body,
        })
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
