//! Declarative backend configuration.
//!
//! ```yaml
//! start_timeout_ms: 5000
//! backends:
//!   - protocol: http
//!     port: 18080
//!     rules:
//!       - method: GET
//!         path: {pattern: "^/se"}
//!         query: {q: vk}
//!         ignore_extra_query: true
//!         response: {status: 200, body: found}
//!   - protocol: tcp
//!     port: 18081
//! ```
//!
//! gRPC backends decode requests with compiled message types, so they can
//! only be built in code.

use crate::backend::Backend;
use crate::error::BackendError;
use crate::http::{FixedResult, HttpBackend, HttpRule};
use crate::predicate::{MappingConfig, MatcherConfig};
use crate::tcp::TcpBackend;
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

fn default_start_timeout_ms() -> u64 {
    5000
}

fn default_status() -> u16 {
    200
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BackendsConfig {
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,
    pub backends: Vec<BackendConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum BackendConfig {
    Http {
        port: u16,
        /// An empty list means the single default rule.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rules: Vec<HttpRuleConfig>,
    },
    Grpc {
        port: u16,
    },
    Tcp {
        port: u16,
    },
}

impl BackendConfig {
    pub fn port(&self) -> u16 {
        match self {
            BackendConfig::Http { port, .. }
            | BackendConfig::Grpc { port }
            | BackendConfig::Tcp { port } => *port,
        }
    }

    pub fn into_backend(&self) -> Result<Box<dyn Backend>, BackendError> {
        match self {
            BackendConfig::Http { port, rules } if rules.is_empty() => {
                Ok(Box::new(HttpBackend::new(*port)))
            }
            BackendConfig::Http { port, rules } => {
                let rules = rules
                    .iter()
                    .map(HttpRuleConfig::compile)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Box::new(HttpBackend::with_rules(*port, rules)))
            }
            BackendConfig::Tcp { port } => Ok(Box::new(TcpBackend::new(*port))),
            BackendConfig::Grpc { port } => Err(BackendError::Config(format!(
                "grpc backend on port {port} cannot be configured from a file; \
                 gRPC rules need compiled message types"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct HttpRuleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<MatcherConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<MappingConfig>,
    #[serde(default)]
    pub ignore_extra_query: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<MappingConfig>,
    #[serde(default)]
    pub ignore_extra_headers: bool,
    /// Omitted means the default rule result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseConfig>,
}

impl HttpRuleConfig {
    pub fn compile(&self) -> Result<HttpRule, BackendError> {
        let mut rule = HttpRule::new()
            .ignore_extra_query_params(self.ignore_extra_query)
            .ignore_extra_headers(self.ignore_extra_headers);

        if let Some(method) = &self.method {
            rule = rule.method(method.clone());
        }
        if let Some(path) = &self.path {
            rule = rule.path(path.compile()?);
        }
        if let Some(query) = &self.query {
            rule = rule.query_params(query.compile()?);
        }
        if let Some(headers) = &self.headers {
            rule = rule.headers(headers.compile()?);
        }
        if let Some(response) = &self.response {
            rule = rule.result(response.to_result()?);
        }
        Ok(rule)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ResponseConfig {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl ResponseConfig {
    pub fn to_result(&self) -> Result<FixedResult, BackendError> {
        StatusCode::from_u16(self.status)
            .map_err(|_| BackendError::Config(format!("invalid status code {}", self.status)))?;
        Ok(self
            .headers
            .iter()
            .fold(FixedResult::new(self.body.clone(), self.status), |result, (k, v)| {
                result.with_header(k.clone(), v.clone())
            }))
    }
}

impl BackendsConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, anyhow::Error> {
        let config: BackendsConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.backends.is_empty() {
            anyhow::bail!("At least one backend must be configured");
        }

        let mut ports = HashSet::new();
        for backend in &self.backends {
            if !ports.insert(backend.port()) {
                anyhow::bail!(
                    "Port {} is used by more than one backend",
                    backend.port()
                );
            }
        }

        // Compiling checks patterns, matchers and response status codes
        for backend in &self.backends {
            backend.into_backend()?;
        }
        Ok(())
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn into_backends(&self) -> Result<Vec<Box<dyn Backend>>, BackendError> {
        self.backends.iter().map(BackendConfig::into_backend).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Protocol;
    use crate::http::HttpRequest;
    use hyper::Method;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const EXAMPLE: &str = r#"
start_timeout_ms: 2500
backends:
  - protocol: http
    port: 18080
    rules:
      - method: GET
        path: {pattern: "^/se"}
        query: {q: vk}
        ignore_extra_query: true
        headers:
          - key: {pattern: "^x-"}
            value: {any: true}
            optional: true
        ignore_extra_headers: true
        response: {status: 200, body: "found", headers: {content-type: text/plain}}
      - {}
  - protocol: tcp
    port: 18081
"#;

    #[test]
    fn test_parse_example() {
        let config = BackendsConfig::from_yaml(EXAMPLE).unwrap();
        assert_eq!(config.start_timeout(), Duration::from_millis(2500));
        assert_eq!(config.backends.len(), 2);

        let BackendConfig::Http { port, rules } = &config.backends[0] else {
            panic!("expected an http backend");
        };
        assert_eq!(*port, 18080);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].method.as_deref(), Some("GET"));
        assert!(rules[0].ignore_extra_query);
        assert_eq!(rules[1], HttpRuleConfig::default());
        assert_eq!(config.backends[1], BackendConfig::Tcp { port: 18081 });
    }

    #[test]
    fn test_compiled_rule_matches() {
        let config = BackendsConfig::from_yaml(EXAMPLE).unwrap();
        let BackendConfig::Http { rules, .. } = &config.backends[0] else {
            panic!("expected an http backend");
        };
        let rule = rules[0].compile().unwrap();

        let request = HttpRequest::new(Method::GET, "/search")
            .with_query("q", "vk")
            .with_query("num", "10")
            .with_header("X-Trace", "1")
            .with_header("host", "localhost");
        assert!(rule.matches(&request));
        assert!(!rule.matches(&HttpRequest::new(Method::GET, "/other").with_query("q", "vk")));
        assert!(!rule.matches(&HttpRequest::new(Method::GET, "/search").with_query("q", "ya")));
    }

    #[test]
    fn test_into_backends() {
        let config = BackendsConfig::from_yaml(EXAMPLE).unwrap();
        let backends = config.into_backends().unwrap();
        assert_eq!(backends.len(), 2);
        assert_eq!(backends[0].protocol(), Protocol::Http);
        assert_eq!(backends[1].name(), "tcp backend on port 18081");
    }

    #[test]
    fn test_defaults() {
        let config = BackendsConfig::from_yaml("backends: [{protocol: http, port: 1}]").unwrap();
        assert_eq!(config.start_timeout_ms, 5000);
        assert_eq!(
            config.backends[0],
            BackendConfig::Http {
                port: 1,
                rules: Vec::new()
            }
        );

        let response: ResponseConfig = serde_yaml::from_str("body: hi").unwrap();
        assert_eq!(response.status, 200);
    }

    #[test]
    fn test_validation_errors() {
        let err = BackendsConfig::from_yaml("backends: []").unwrap_err();
        assert!(err.to_string().contains("At least one backend"));

        let err = BackendsConfig::from_yaml(
            "backends: [{protocol: http, port: 1}, {protocol: tcp, port: 1}]",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Port 1"));

        let err = BackendsConfig::from_yaml("backends: [{protocol: grpc, port: 1}]").unwrap_err();
        assert!(err.to_string().contains("compiled message types"));

        let err = BackendsConfig::from_yaml(
            "backends: [{protocol: http, port: 1, rules: [{path: {pattern: '('}}]}]",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Invalid pattern"));

        let err = BackendsConfig::from_yaml(
            "backends: [{protocol: http, port: 1, rules: [{response: {status: 42}}]}]",
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid status code 42"));

        assert!(BackendsConfig::from_yaml("backends: [{protocol: udp, port: 1}]").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(EXAMPLE.as_bytes()).unwrap();

        let config = BackendsConfig::from_file(file.path()).unwrap();
        assert_eq!(config.backends.len(), 2);

        assert!(BackendsConfig::from_file("/nonexistent/backends.yaml").is_err());
    }
}
