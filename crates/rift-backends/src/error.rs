use crate::launcher::Worker;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backends {backends:?} are configured with the same port {port}")]
    DuplicatePort { port: u16, backends: Vec<String> },

    #[error(
        "There are backends which are not started with start_timeout={timeout:?} \
         ({started} of {expected} signalled).\nstart_signals={signals:?}"
    )]
    StartupTimeout {
        timeout: Duration,
        expected: usize,
        started: usize,
        signals: Vec<String>,
        /// Every worker that was spawned, started or not. Dropping them terminates them.
        workers: Vec<Worker>,
    },

    #[error("{app} not starts with given timeout {timeout:?}\n\n{app} ERRORS:\n\n{}", format_errors(.errors))]
    AppStartupTimeout {
        app: String,
        timeout: Duration,
        errors: Vec<String>,
    },

    #[error("Failed to bind to address {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build backend runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker {0} panicked")]
    WorkerPanicked(String),

    #[error("Worker {name} did not stop within {timeout:?} and was detached")]
    StopTimeout { name: String, timeout: Duration },

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),
}

fn format_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        "<empty>".to_string()
    } else {
        errors.join("\n***\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_timeout_lists_errors() {
        let err = BackendError::AppStartupTimeout {
            app: "application demo".to_string(),
            timeout: Duration::from_secs(1),
            errors: vec!["boom".to_string(), "bang".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("application demo ERRORS"));
        assert!(text.contains("boom\n***\nbang"));
    }

    #[test]
    fn test_app_timeout_without_errors() {
        let err = BackendError::AppStartupTimeout {
            app: "demo".to_string(),
            timeout: Duration::from_secs(1),
            errors: Vec::new(),
        };
        assert!(err.to_string().ends_with("<empty>"));
    }
}
