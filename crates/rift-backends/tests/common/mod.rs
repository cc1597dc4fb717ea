//! Helpers shared by the integration tests.
#![allow(dead_code)]

use bytes::Bytes;
use rift_backends::grpc::RawCodec;
use std::time::Duration;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Unary gRPC call on `path` carrying an already encoded request message.
pub async fn grpc_call(port: u16, path: &str, request: &[u8]) -> Result<Bytes, tonic::Status> {
    let channel = Channel::from_shared(format!("http://127.0.0.1:{port}"))
        .expect("Invalid endpoint")
        .connect()
        .await
        .expect("Failed to connect to gRPC backend");
    let mut client = tonic::client::Grpc::new(channel);
    client.ready().await.expect("gRPC channel not ready");

    let path = PathAndQuery::try_from(path).expect("Invalid method path");
    client
        .unary(
            tonic::Request::new(Bytes::copy_from_slice(request)),
            path,
            RawCodec,
        )
        .await
        .map(tonic::Response::into_inner)
}
