use super::codec::RawCodec;
use super::rule::{dispatch, GrpcRule};
use crate::backend::{Backend, Protocol, Readiness};
use crate::error::BackendError;
use async_trait::async_trait;
use bytes::Bytes;
use hyper::body::Incoming;
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::future::{ready, Ready};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tonic::body::BoxBody;
use tonic::server::{Grpc, UnaryService};
use tonic::Status;
use tracing::{debug, error, info};

/// Insecure gRPC backend serving unary calls from its rule list.
///
/// Any method path is accepted; which calls succeed is decided by the rules alone.
#[derive(Debug, Clone)]
pub struct GrpcBackend {
    port: u16,
    host: IpAddr,
    rules: Arc<Vec<GrpcRule>>,
}

impl GrpcBackend {
    /// Listens on `[::]:port`.
    pub fn new(port: u16, rules: Vec<GrpcRule>) -> Self {
        Self {
            port,
            host: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            rules: Arc::new(rules),
        }
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn rules(&self) -> &[GrpcRule] {
        &self.rules
    }
}

/// One unary call on `method`, answered by the first matching rule.
struct RuleCall {
    rules: Arc<Vec<GrpcRule>>,
    method: String,
}

impl UnaryService<Bytes> for RuleCall {
    type Response = Bytes;
    type Future = Ready<Result<tonic::Response<Bytes>, Status>>;

    fn call(&mut self, request: tonic::Request<Bytes>) -> Self::Future {
        ready(dispatch(&self.rules, &self.method, request.get_ref()).map(tonic::Response::new))
    }
}

async fn handle_call(
    req: Request<Incoming>,
    rules: Arc<Vec<GrpcRule>>,
) -> Result<Response<BoxBody>, Infallible> {
    let call = RuleCall {
        rules,
        method: req.uri().path().to_string(),
    };
    let mut grpc = Grpc::new(RawCodec);
    Ok(grpc.unary(call, req).await)
}

#[async_trait]
impl Backend for GrpcBackend {
    fn port(&self) -> u16 {
        self.port
    }

    fn protocol(&self) -> Protocol {
        Protocol::Grpc
    }

    async fn start_server(&self, readiness: Readiness) -> Result<(), BackendError> {
        let addr = SocketAddr::new(self.host, self.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| BackendError::Bind { addr, source })?;

        info!("Start serving on {}", addr);
        readiness.signal();

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let rules = Arc::clone(&self.rules);
                    let port = self.port;
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| handle_call(req, Arc::clone(&rules)));
                        if let Err(e) = http2::Builder::new(TokioExecutor::new())
                            .serve_connection(io, service)
                            .await
                        {
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
