//! Backend lifecycle contract.
//!
//! Every mock server implements [`Backend`]. A backend binds its port inside
//! [`Backend::start_server`], calls [`Readiness::signal`] once the listener is
//! accepting connections and then serves until its future is dropped.

use crate::error::BackendError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Wire protocol of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    Grpc,
    Tcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Grpc => "grpc",
            Protocol::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only list of start messages shared between the launcher and its workers.
///
/// Only its length is meaningful to the launcher; the entries are kept for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ReadinessBoard {
    signals: Arc<Mutex<Vec<String>>>,
}

impl ReadinessBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, signal: String) {
        self.signals.lock().push(signal);
    }

    pub fn len(&self) -> usize {
        self.signals.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.signals.lock().clone()
    }
}

/// Per-backend readiness handle.
///
/// Signalling without a board (a backend run standalone) only flips the local flag.
#[derive(Debug, Clone)]
pub struct Readiness {
    name: String,
    board: Option<ReadinessBoard>,
    ready: Arc<AtomicBool>,
}

impl Readiness {
    pub fn new(name: impl Into<String>, board: Option<ReadinessBoard>) -> Self {
        Self {
            name: name.into(),
            board,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Record that the backend is accepting connections. Only the first call counts.
    pub fn signal(&self) {
        if self.ready.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(board) = &self.board {
            board.push(format!("{} start message", self.name));
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A mock server that can be launched by the [`crate::launcher`].
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Port the backend listens on. Must be unique within a launch group.
    fn port(&self) -> u16;

    fn protocol(&self) -> Protocol;

    /// Human-readable identity used in readiness tokens, thread names and errors.
    fn name(&self) -> String {
        format!("{} backend on port {}", self.protocol(), self.port())
    }

    /// Bind, signal readiness, then serve forever.
    ///
    /// Implementations must call [`Readiness::signal`] only after the listener
    /// is bound. Returning `Err` means the backend never became ready.
    async fn start_server(&self, readiness: Readiness) -> Result<(), BackendError>;

    /// Run the backend on the calling thread with its own single-threaded
    /// runtime, blocking until the server stops.
    fn run(&self, board: Option<ReadinessBoard>) -> Result<(), BackendError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(BackendError::Runtime)?;
        runtime.block_on(self.start_server(Readiness::new(self.name(), board)))
    }
}
