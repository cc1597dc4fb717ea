//! Result producers: turn a matched rule into an HTTP response.

use super::request::HttpRequest;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde_json::Value;

/// Builds the response for a matched rule.
///
/// Implementations must not keep per-request mutable state; every match
/// produces its response independently.
#[async_trait]
pub trait HttpResult: Send + Sync {
    async fn process(&self, request: &HttpRequest) -> Response<Full<Bytes>>;
}

/// Fixed body and status, plus optional headers.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedResult {
    pub body: Bytes,
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl FixedResult {
    pub fn new(body: impl Into<Bytes>, status: u16) -> Self {
        Self {
            body: body.into(),
            status,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl Default for FixedResult {
    fn default() -> Self {
        Self::new(Bytes::new(), 200)
    }
}

#[async_trait]
impl HttpResult for FixedResult {
    async fn process(&self, _request: &HttpRequest) -> Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = build_response(status, self.body.clone());
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                response.headers_mut().append(name, value);
            }
        }
        response
    }
}

/// Custom processor backed by a closure.
pub struct FnResult<F> {
    processor: F,
}

/// Wrap a closure as an [`HttpResult`].
pub fn from_fn<F>(processor: F) -> FnResult<F>
where
    F: Fn(&HttpRequest) -> Response<Full<Bytes>> + Send + Sync,
{
    FnResult { processor }
}

#[async_trait]
impl<F> HttpResult for FnResult<F>
where
    F: Fn(&HttpRequest) -> Response<Full<Bytes>> + Send + Sync,
{
    async fn process(&self, request: &HttpRequest) -> Response<Full<Bytes>> {
        (self.processor)(request)
    }
}

pub fn build_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

pub fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let mut response = build_response(status, body.to_string());
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
