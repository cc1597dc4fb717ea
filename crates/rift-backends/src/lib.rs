//! Rule-driven mock backends for integration tests.
//!
//! Build HTTP, gRPC or TCP backends, hand them to the [`launcher`], and
//! every backend runs on its own worker with its own event loop. The launcher
//! returns once all of them listen, or fails with a startup timeout.
//!
//! ```no_run
//! use rift_backends::http::{HttpBackend, HttpRule};
//! use rift_backends::launcher::backends_manager;
//! use rift_backends::Backend;
//!
//! let backends: Vec<Box<dyn Backend>> = vec![Box::new(HttpBackend::with_rules(
//!     18080,
//!     vec![
//!         HttpRule::new().path("/search").respond("found", 200),
//!         HttpRule::default(),
//!     ],
//! ))];
//! let _guard = backends_manager(backends)?;
//! // ... exercise the system under test ...
//! # Ok::<(), rift_backends::BackendError>(())
//! ```

// ===== Backends =====
pub mod backend;
pub mod grpc;
pub mod http;
pub mod tcp;

// ===== Matching =====
pub mod predicate;

// ===== Orchestration and log capture =====
pub mod app;
pub mod launcher;
pub mod logs;

// ===== Test support =====
pub mod asserts;
pub mod config;
pub mod spy;
pub mod telemetry;

mod error;

pub use backend::{Backend, Protocol, Readiness, ReadinessBoard};
pub use error::BackendError;
pub use launcher::{backends_manager, start_backends, BackendsGuard, Launcher, Worker};
pub use logs::{LogRecord, LogsStorage};
