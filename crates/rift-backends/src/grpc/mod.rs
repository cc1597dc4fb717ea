//! Rule-driven gRPC backend for unary calls.
//!
//! Requests are not routed by a compiled service definition. Each
//! [`GrpcRule`] names the prost message type used to decode the payload,
//! an optional method, and an optional matcher over the decoded fields.
//! The first rule whose method and fields match produces the response
//! bytes; when none does the call fails with `INVALID_ARGUMENT`.
//!
//! Framing, trailers and status codes are handled by `tonic`; payloads travel
//! through [`RawCodec`] untouched until a rule decodes them.
//!
//! ```no_run
//! use rift_backends::grpc::{GrpcBackend, GrpcRule};
//! use rift_backends::predicate::MappingValidator;
//!
//! #[derive(Clone, PartialEq, prost::Message, serde::Serialize)]
//! struct LookupRequest {
//!     #[prost(string, tag = "1")]
//!     id: String,
//! }
//!
//! let backend = GrpcBackend::new(
//!     50051,
//!     vec![GrpcRule::new(|_: &LookupRequest| b"raw reply".to_vec())
//!         .method("Lookup")
//!         .fields(MappingValidator::new().entry("id", "42"))],
//! );
//! ```

mod backend;
mod codec;
mod rule;

pub use backend::GrpcBackend;
pub use codec::RawCodec;
pub use rule::{dispatch, DecodedRequest, GrpcRule, NO_MATCH_MESSAGE};
