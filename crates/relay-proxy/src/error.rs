//! Proxy error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Backend unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("Backend timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("Failed to read backend response body: {0}")]
    BodyRead(#[source] reqwest::Error),
}

impl ProxyError {
    /// Short label used for logging and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Client(_) => "client",
            ProxyError::Unreachable(_) => "unreachable",
            ProxyError::Timeout(_) => "timeout",
            ProxyError::BodyRead(_) => "body_read",
        }
    }

    /// Classify a failure while sending the request or awaiting headers
    pub(crate) fn from_send(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::Timeout(err)
        } else {
            ProxyError::Unreachable(err)
        }
    }

    /// Classify a failure while reading the response body
    pub(crate) fn from_body(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::Timeout(err)
        } else {
            ProxyError::BodyRead(err)
        }
    }
}
