//! API error types

use axum::extract::rejection::BytesRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use relay_proxy::ProxyError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Backend error: {0}")]
    Backend(#[from] ProxyError),

    #[error("Invalid request body: {0}")]
    RequestBody(#[from] BytesRejection),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Backend(e) => match e {
                ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                ProxyError::BodyRead(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ProxyError::Unreachable(_) | ProxyError::Client(_) => StatusCode::BAD_GATEWAY,
            },
            ApiError::RequestBody(e) => e.status(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ApiError::Backend(e) => match e {
                ProxyError::Timeout(_) => "BACKEND_TIMEOUT",
                ProxyError::BodyRead(_) => "BACKEND_BODY_READ",
                ProxyError::Unreachable(_) | ProxyError::Client(_) => "BACKEND_UNREACHABLE",
            },
            ApiError::RequestBody(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "PAYLOAD_TOO_LARGE"
            }
            ApiError::RequestBody(_) => "INVALID_REQUEST_BODY",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = axum::Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        let mut response = (status, body).into_response();
        if matches!(self, ApiError::MethodNotAllowed) {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("GET, POST"));
        }
        response
    }
}
