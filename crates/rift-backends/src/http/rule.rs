use super::request::HttpRequest;
use super::result::{FixedResult, HttpResult};
use crate::predicate::{Matcher, MappingValidator};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Body returned by [`HttpRule::default`].
pub const DEFAULT_RESULT_BODY: &str = "HTTP BACKEND RESULT";

/// Decides from the incoming method, path, query parameters and headers
/// which result to give to the client.
///
/// Unset criteria always match, so the default rule matches every request.
#[derive(Clone)]
pub struct HttpRule {
    /// Compared ignoring case.
    pub method: Option<String>,
    pub path: Option<Matcher>,
    pub query_params: Option<MappingValidator>,
    pub ignore_extra_query_params: bool,
    /// Keys are compared ignoring case.
    pub headers: Option<MappingValidator>,
    pub ignore_extra_headers: bool,
    pub result: Arc<dyn HttpResult>,
}

impl Default for HttpRule {
    fn default() -> Self {
        Self {
            method: None,
            path: None,
            query_params: None,
            ignore_extra_query_params: false,
            headers: None,
            ignore_extra_headers: false,
            result: Arc::new(FixedResult::new(DEFAULT_RESULT_BODY, 200)),
        }
    }
}

impl HttpRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn path(mut self, path: impl Into<Matcher>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn query_params(mut self, validator: MappingValidator) -> Self {
        self.query_params = Some(validator);
        self
    }

    pub fn ignore_extra_query_params(mut self, ignore: bool) -> Self {
        self.ignore_extra_query_params = ignore;
        self
    }

    pub fn headers(mut self, validator: MappingValidator) -> Self {
        self.headers = Some(validator);
        self
    }

    pub fn ignore_extra_headers(mut self, ignore: bool) -> Self {
        self.ignore_extra_headers = ignore;
        self
    }

    pub fn result(mut self, result: impl HttpResult + 'static) -> Self {
        self.result = Arc::new(result);
        self
    }

    /// Shorthand for a [`FixedResult`].
    pub fn respond(self, body: &str, status: u16) -> Self {
        self.result(FixedResult::new(body.to_string(), status))
    }

    pub fn matches(&self, request: &HttpRequest) -> bool {
        self.method_matches(request)
            && self.path_matches(request)
            && self.query_params_match(request)
            && self.headers_match(request)
    }

    pub fn method_matches(&self, request: &HttpRequest) -> bool {
        self.method
            .as_deref()
            .is_none_or(|m| m.eq_ignore_ascii_case(request.method.as_str()))
    }

    /// Literal paths must be equal; patterns use search semantics.
    pub fn path_matches(&self, request: &HttpRequest) -> bool {
        self.path
            .as_ref()
            .is_none_or(|m| m.is_match(&Value::String(request.path.clone())))
    }

    pub fn query_params_match(&self, request: &HttpRequest) -> bool {
        self.query_params
            .as_ref()
            .is_none_or(|v| v.is_valid(&request.query, self.ignore_extra_query_params))
    }

    pub fn headers_match(&self, request: &HttpRequest) -> bool {
        self.headers.as_ref().is_none_or(|v| {
            v.is_valid_ignoring_key_case(&request.headers, self.ignore_extra_headers)
        })
    }
}

impl fmt::Debug for HttpRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRule")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query_params", &self.query_params)
            .field("ignore_extra_query_params", &self.ignore_extra_query_params)
            .field("headers", &self.headers)
            .field("ignore_extra_headers", &self.ignore_extra_headers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Method;

    fn request() -> HttpRequest {
        HttpRequest::new(Method::GET, "/search")
            .with_query("q", "vk")
            .with_query("num", "10")
            .with_header("Foo", "bar")
            .with_header("foo1", "bar1")
            .with_header("FOO2", "bar2")
    }

    #[test]
    fn test_default_rule_matches_everything() {
        let rule = HttpRule::default();
        assert!(rule.method.is_none());
        assert!(rule.path.is_none());
        assert!(rule.query_params.is_none());
        assert!(rule.headers.is_none());
        assert!(rule.matches(&request()));
        assert!(rule.matches(&HttpRequest::new(Method::DELETE, "/")));
    }

    #[test]
    fn test_method_matches() {
        let cases = [
            (None, true),
            (Some("get"), true),
            (Some("GeT"), true),
            (Some("post"), false),
            (Some(""), false),
        ];
        for (method, expected) in cases {
            let mut rule = HttpRule::new();
            rule.method = method.map(String::from);
            assert_eq!(rule.method_matches(&request()), expected, "method {method:?}");
        }
    }

    #[test]
    fn test_path_matches() {
        let cases = [
            (None, true),
            (Some(Matcher::from("/search")), true),
            (Some(Matcher::from("/another_search")), false),
            (Some(Matcher::from("")), false),
            (Some(Matcher::pattern("/se.*").unwrap()), true),
            (Some(Matcher::pattern("/an.*").unwrap()), false),
        ];
        for (path, expected) in cases {
            let mut rule = HttpRule::new();
            rule.path = path.clone();
            assert_eq!(rule.path_matches(&request()), expected, "path {path:?}");
        }
    }

    #[test]
    fn test_query_tolerance_flag() {
        let rule = HttpRule::new().query_params([("q", "vk")].into_iter().collect());
        assert!(!rule.query_params_match(&request()));

        let rule = rule.ignore_extra_query_params(true);
        assert!(rule.query_params_match(&request()));
    }

    #[test]
    fn test_header_keys_are_case_insensitive() {
        let rule = HttpRule::new()
            .headers([("FOO", "bar"), ("Foo1", "bar1"), ("foo2", "bar2")].into_iter().collect());
        assert!(rule.headers_match(&request()));

        let rule = HttpRule::new()
            .headers([("foo", "bar")].into_iter().collect())
            .ignore_extra_headers(true);
        assert!(rule.headers_match(&request()));
    }

    #[test]
    fn test_header_field_set_directly_ignores_key_case() {
        let mut rule = HttpRule::new().ignore_extra_headers(true);
        rule.headers = Some([("FOO2", "bar2")].into_iter().collect());
        assert!(rule.headers_match(&request()));

        rule.headers = Some([("FOO2", "other")].into_iter().collect());
        assert!(!rule.headers_match(&request()));
    }

    #[test]
    fn test_matches_requires_every_criterion() {
        let rule = HttpRule::new()
            .method("GET")
            .path("/search")
            .query_params(MappingValidator::new().entry("q", "vk"))
            .ignore_extra_query_params(true);
        assert!(rule.matches(&request()));

        let rule = rule.method("POST");
        assert!(!rule.matches(&request()));
    }
}
