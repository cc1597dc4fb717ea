use super::request::HttpRequest;
use super::result::{build_response, json_response, HttpResult};
use super::rule::HttpRule;
use crate::backend::{Backend, Protocol, Readiness};
use crate::error::BackendError;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

const NO_MATCH_MESSAGE: &str = "No matching rule found for incoming request";

/// HTTP/1.1 backend answering every request from its rule list.
///
/// Binds `127.0.0.1` by default (IPv4 explicitly; some CI hosts have no IPv6).
#[derive(Debug, Clone)]
pub struct HttpBackend {
    port: u16,
    host: IpAddr,
    rules: Arc<Vec<HttpRule>>,
}

impl HttpBackend {
    /// Backend with the single default rule.
    pub fn new(port: u16) -> Self {
        Self::with_rules(port, vec![HttpRule::default()])
    }

    pub fn with_rules(port: u16, rules: Vec<HttpRule>) -> Self {
        Self {
            port,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            rules: Arc::new(rules),
        }
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn rules(&self) -> &[HttpRule] {
        &self.rules
    }

    /// Evaluate the rules in order; the first match produces the response.
    pub async fn handle(&self, request: &HttpRequest) -> Response<Full<Bytes>> {
        dispatch(&self.rules, request).await
    }
}

async fn dispatch(rules: &[HttpRule], request: &HttpRequest) -> Response<Full<Bytes>> {
    for (index, rule) in rules.iter().enumerate() {
        if rule.matches(request) {
            debug!("Rule {} matched {} {}", index, request.method, request.path);
            return rule.result.process(request).await;
        }
    }

    warn!(
        "No matching rule found for {} {}",
        request.method, request.path
    );
    json_response(
        StatusCode::NOT_FOUND,
        &json!({
            "ERROR": NO_MATCH_MESSAGE,
            "incoming_request_info": request.describe(),
        }),
    )
}

fn is_routed(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

async fn handle_request(
    req: Request<Incoming>,
    rules: Arc<Vec<HttpRule>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if !is_routed(req.method()) {
        return Ok(build_response(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("Method {} is not allowed", req.method()),
        ));
    }

    match HttpRequest::from_hyper(req).await {
        Ok(request) => Ok(dispatch(&rules, &request).await),
        Err(e) => {
            debug!("Failed to read request body: {}", e);
            Ok(build_response(
                StatusCode::BAD_REQUEST,
                format!("Failed to read request body: {e}"),
            ))
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn port(&self) -> u16 {
        self.port
    }

    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    async fn start_server(&self, readiness: Readiness) -> Result<(), BackendError> {
        let addr = SocketAddr::new(self.host, self.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| BackendError::Bind { addr, source })?;

        info!("Start serving on http://{}", addr);
        readiness.signal();

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let rules = Arc::clone(&self.rules);
                    let port = self.port;
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| handle_request(req, Arc::clone(&rules)));
                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            debug!("Connection error on port {}: {}", port, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error on port {}: {}", self.port, e);
                }
            }
        }
    }
}
