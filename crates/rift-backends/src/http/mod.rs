//! Rule-driven HTTP backend.
//!
//! - `request`: request snapshot handed to rules and results
//! - `rule`: [`HttpRule`] matching on method, path, query parameters and headers
//! - `result`: [`HttpResult`] producers (fixed body/status or custom closure)
//! - `backend`: [`HttpBackend`] server loop and no-match handling

mod backend;
mod request;
mod result;
mod rule;

pub use backend::HttpBackend;
pub use request::{parse_query_string, HttpRequest};
pub use result::{build_response, from_fn, json_response, FixedResult, FnResult, HttpResult};
pub use rule::{HttpRule, DEFAULT_RESULT_BODY};
