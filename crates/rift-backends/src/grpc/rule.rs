use crate::predicate::MappingValidator;
use bytes::Bytes;
use prost::Message;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tonic::Status;
use tracing::{debug, warn};

/// Message sent with `INVALID_ARGUMENT` when no rule accepts a call.
pub const NO_MATCH_MESSAGE: &str = "no matched GRPC rules found";

type Decoder = dyn Fn(&[u8]) -> Result<DecodedRequest, Status> + Send + Sync;

/// A request payload decoded with a rule's message type.
pub struct DecodedRequest {
    fields: Map<String, Value>,
    respond: Box<dyn FnOnce() -> Bytes + Send>,
}

impl DecodedRequest {
    /// Fields of the decoded message, as its serde form names them.
    ///
    /// Unset message fields, scalars holding their default value and empty
    /// repeated fields are absent. Sub-messages that are set stay present,
    /// even when empty. A proto3 `optional` scalar explicitly set to its
    /// default serializes like an unset scalar and is absent too.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn respond(self) -> Bytes {
        (self.respond)()
    }
}

/// Decides from the called method and the decoded request message whether
/// this rule answers a unary call, and with which bytes.
#[derive(Clone)]
pub struct GrpcRule {
    /// Full `/package.Service/Method` path or bare method name, compared ignoring case.
    pub method: Option<String>,
    pub fields: Option<MappingValidator>,
    pub ignore_extra_fields: bool,
    message_type: &'static str,
    decoder: Arc<Decoder>,
}

impl GrpcRule {
    /// Rule decoding requests as `M` and answering with the bytes `handler` returns.
    pub fn new<M, F>(handler: F) -> Self
    where
        M: Message + Default + Serialize + Send + 'static,
        F: Fn(&M) -> Vec<u8> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let decoder = move |payload: &[u8]| {
            let message = M::decode(payload).map_err(|e| {
                Status::internal(format!(
                    "failed to decode {}: {}",
                    std::any::type_name::<M>(),
                    e
                ))
            })?;
            let fields = message_fields(&message)?;
            let handler = Arc::clone(&handler);
            Ok(DecodedRequest {
                fields,
                respond: Box::new(move || Bytes::from(handler(&message))),
            })
        };

        Self {
            method: None,
            fields: None,
            ignore_extra_fields: false,
            message_type: std::any::type_name::<M>(),
            decoder: Arc::new(decoder),
        }
    }

    /// Rule answering with the encoding of the message `handler` builds.
    pub fn reply<M, R, F>(handler: F) -> Self
    where
        M: Message + Default + Serialize + Send + 'static,
        R: Message,
        F: Fn(&M) -> R + Send + Sync + 'static,
    {
        Self::new(move |request: &M| handler(request).encode_to_vec())
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn fields(mut self, validator: MappingValidator) -> Self {
        self.fields = Some(validator);
        self
    }

    pub fn ignore_extra_fields(mut self, ignore: bool) -> Self {
        self.ignore_extra_fields = ignore;
        self
    }

    pub fn method_matches(&self, path: &str) -> bool {
        self.method.as_deref().is_none_or(|expected| {
            let bare = path.rsplit('/').next().unwrap_or(path);
            expected.eq_ignore_ascii_case(path) || expected.eq_ignore_ascii_case(bare)
        })
    }

    pub fn message_matches(&self, fields: &Map<String, Value>) -> bool {
        self.fields
            .as_ref()
            .is_none_or(|v| v.is_valid(fields, self.ignore_extra_fields))
    }

    pub fn decode(&self, payload: &[u8]) -> Result<DecodedRequest, Status> {
        (self.decoder)(payload)
    }
}

impl fmt::Debug for GrpcRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrpcRule")
            .field("method", &self.method)
            .field("fields", &self.fields)
            .field("ignore_extra_fields", &self.ignore_extra_fields)
            .field("message_type", &self.message_type)
            .finish()
    }
}

/// Evaluate `rules` in order against a unary call. The payload is decoded
/// only for rules whose method matches.
pub fn dispatch(rules: &[GrpcRule], method: &str, payload: &[u8]) -> Result<Bytes, Status> {
    for (index, rule) in rules.iter().enumerate() {
        if !rule.method_matches(method) {
            continue;
        }
        let request = rule.decode(payload)?;
        if rule.message_matches(request.fields()) {
            debug!("Rule {} matched {}", index, method);
            return Ok(request.respond());
        }
    }

    warn!("No matching GRPC rule found for {}", method);
    Err(Status::invalid_argument(NO_MATCH_MESSAGE))
}

/// Field name to value mapping without the fields proto3 leaves off the wire.
fn message_fields<M: Serialize>(message: &M) -> Result<Map<String, Value>, Status> {
    match serde_json::to_value(message) {
        Ok(Value::Object(fields)) => Ok(set_fields(fields)),
        Ok(other) => Err(Status::internal(format!(
            "message does not serialize to a mapping: {}",
            other
        ))),
        Err(e) => Err(Status::internal(format!(
            "failed to inspect message fields: {}",
            e
        ))),
    }
}

/// Recurses into set sub-messages, which stay present even when left empty.
fn set_fields(fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .filter(|(_, value)| !is_default(value))
        .map(|(name, value)| match value {
            Value::Object(nested) => (name, Value::Object(set_fields(nested))),
            other => (name, other),
        })
        .collect()
}

/// `null` is an unset message or `optional` field; objects are set sub-messages.
fn is_default(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
    }
}
