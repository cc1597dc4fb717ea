//! Raw TCP echo backend.

use crate::backend::{Backend, Protocol, Readiness};
use crate::error::BackendError;
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Largest chunk read from a connection before it is echoed back.
pub const ECHO_BUFFER_SIZE: usize = 1024;

/// Reads up to [`ECHO_BUFFER_SIZE`] bytes once per connection, writes them
/// back and closes the connection.
#[derive(Debug, Clone)]
pub struct TcpBackend {
    port: u16,
    host: IpAddr,
}

impl TcpBackend {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }
}

async fn echo_once(mut stream: TcpStream) -> std::io::Result<usize> {
    let mut buf = [0u8; ECHO_BUFFER_SIZE];
    let n = stream.read(&mut buf).await?;
    stream.write_all(&buf[..n]).await?;
    stream.shutdown().await?;
    Ok(n)
}

#[async_trait]
impl Backend for TcpBackend {
    fn port(&self) -> u16 {
        self.port
    }

    fn protocol(&self) -> Protocol {
        Protocol::Tcp
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
                Ok((stream, peer)) => {
                    tokio::spawn(async move {
                        match echo_once(stream).await {
                            Ok(n) => debug!("Echoed {} bytes to {}", n, peer),
                            Err(e) => debug!("Connection error with {}: {}", peer, e),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ReadinessBoard;
    use std::time::Duration;

    #[tokio::test]
    async fn test_echo_once_then_close() {
        let backend = TcpBackend::new(0);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            echo_once(stream).await.unwrap()
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut echoed = Vec::new();
        client.read_to_end(&mut echoed).await.unwrap();

        assert_eq!(echoed, b"ping");
        assert_eq!(server.await.unwrap(), 4);
        assert_eq!(backend.name(), "tcp backend on port 0");
    }

    #[tokio::test]
    async fn test_start_server_signals_after_bind() {
        let board = ReadinessBoard::new();
        let readiness = Readiness::new("tcp", Some(board.clone()));
        let backend = TcpBackend::new(17999);

        let server = tokio::spawn(async move { backend.start_server(readiness).await });
        for _ in 0..500 {
            if !board.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(board.len(), 1);

        let mut client = TcpStream::connect("127.0.0.1:17999").await.unwrap();
        client.write_all(b"hello").await.unwrap();
        let mut echoed = Vec::new();
        client.read_to_end(&mut echoed).await.unwrap();
        assert_eq!(echoed, b"hello");

        server.abort();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = TcpBackend::new(port)
            .start_server(Readiness::new("tcp", None))
            .await;
        assert!(matches!(result, Err(BackendError::Bind { .. })));
    }
}
