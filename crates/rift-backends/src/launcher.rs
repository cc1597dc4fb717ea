//! Backend orchestration and startup synchronization.
//!
//! Each backend runs on its own named worker thread, which owns a
//! single-threaded tokio runtime, the listener and the rules. The controller
//! only shares two things with a worker: the [`ReadinessBoard`] it polls while
//! waiting for startup, and (optionally) a [`LogSink`] the worker's log events
//! are relayed into.

use crate::backend::{Backend, Readiness, ReadinessBoard};
use crate::error::BackendError;
use crate::logs::{capture_into, LogSink};
use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);
/// How long a [`BackendsGuard`] waits for terminated workers before detaching them.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Starts groups of backends and waits until every one of them is serving.
#[derive(Debug, Clone)]
pub struct Launcher {
    start_timeout: Duration,
    poll_interval: Duration,
    stop_timeout: Duration,
    log_sink: Option<LogSink>,
    board: Option<ReadinessBoard>,
}

impl Default for Launcher {
    fn default() -> Self {
        Self {
            start_timeout: DEFAULT_START_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            log_sink: None,
            board: None,
        }
    }
}

impl Launcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bound on how long a guard waits for its workers to stop.
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Relay every log event emitted by the workers into `sink`.
    pub fn log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Use a caller-owned readiness board instead of a fresh one per launch.
    pub fn readiness_board(mut self, board: ReadinessBoard) -> Self {
        self.board = Some(board);
        self
    }

    /// Spawn one worker per backend and wait until all of them signal readiness.
    ///
    /// Ports are checked before anything is spawned. On timeout the spawned
    /// workers are left running and handed back inside
    /// [`BackendError::StartupTimeout`]; the caller decides when they stop.
    pub fn start(&self, backends: Vec<Box<dyn Backend>>) -> Result<Vec<Worker>, BackendError> {
        check_unique_ports(&backends)?;

        let board = self.board.clone().unwrap_or_default();
        let baseline = board.len();
        let expected = backends.len();

        let mut workers = Vec::with_capacity(expected);
        for backend in backends {
            workers.push(Worker::spawn(backend, board.clone(), self.log_sink.clone())?);
        }

        match self.wait_for_signals(&board, baseline, expected) {
            Ok(()) => {
                info!("Started {} backends", expected);
                Ok(workers)
            }
            Err(PendingStart { started, signals }) => Err(BackendError::StartupTimeout {
                timeout: self.start_timeout,
                expected,
                started,
                signals,
                workers,
            }),
        }
    }

    /// Like [`Launcher::start`], but the workers are terminated and joined
    /// when the returned guard is dropped.
    pub fn guard(&self, backends: Vec<Box<dyn Backend>>) -> Result<BackendsGuard, BackendError> {
        let workers = self.start(backends)?;
        Ok(BackendsGuard::new(workers).stop_timeout(self.stop_timeout))
    }

    fn wait_for_signals(
        &self,
        board: &ReadinessBoard,
        baseline: usize,
        expected: usize,
    ) -> Result<(), PendingStart> {
        let deadline = Instant::now() + self.start_timeout;
        loop {
            let started = board.len().saturating_sub(baseline);
            if started >= expected {
                return Ok(());
            }
            if Instant::now() >= deadline {
                let signals = board.snapshot().split_off(baseline.min(board.len()));
                warn!(
                    "Only {} of {} backends started within {:?}",
                    started, expected, self.start_timeout
                );
                return Err(PendingStart { started, signals });
            }
            thread::sleep(self.poll_interval);
        }
    }
}

/// Readiness seen when the start timeout ran out.
struct PendingStart {
    started: usize,
    signals: Vec<String>,
}

fn check_unique_ports(backends: &[Box<dyn Backend>]) -> Result<(), BackendError> {
    let mut seen: HashMap<u16, String> = HashMap::new();
    for backend in backends {
        let port = backend.port();
        if let Some(first) = seen.get(&port) {
            return Err(BackendError::DuplicatePort {
                port,
                backends: vec![first.clone(), backend.name()],
            });
        }
        seen.insert(port, backend.name());
    }
    Ok(())
}

/// Start `backends` with the default poll interval and the given timeout.
pub fn start_backends(
    backends: Vec<Box<dyn Backend>>,
    timeout: Duration,
) -> Result<Vec<Worker>, BackendError> {
    Launcher::new().start_timeout(timeout).start(backends)
}

/// Start `backends` with default settings inside a [`BackendsGuard`].
pub fn backends_manager(backends: Vec<Box<dyn Backend>>) -> Result<BackendsGuard, BackendError> {
    Launcher::new().guard(backends)
}

/// Handle to one backend's worker thread.
///
/// Dropping a worker terminates it without waiting for the thread.
#[derive(Debug)]
pub struct Worker {
    name: String,
    port: u16,
    readiness: Readiness,
    shutdown_tx: broadcast::Sender<()>,
    handle: Option<JoinHandle<Result<(), BackendError>>>,
}

impl Worker {
    fn spawn(
        backend: Box<dyn Backend>,
        board: ReadinessBoard,
        log_sink: Option<LogSink>,
    ) -> Result<Self, BackendError> {
        let name = backend.name();
        let port = backend.port();
        let readiness = Readiness::new(name.clone(), Some(board));
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let thread_readiness = readiness.clone();
        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _capture = log_sink.map(capture_into);
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(BackendError::Runtime)?;

                let result = runtime.block_on(async {
                    tokio::select! {
                        result = backend.start_server(thread_readiness) => result,
                        _ = shutdown_rx.recv() => {
                            info!("{} shutting down", thread_name);
                            Ok(())
                        }
                    }
                });
                if let Err(e) = &result {
                    error!("{} failed: {}", thread_name, e);
                }
                result
            })
            .map_err(|source| BackendError::Spawn {
                name: name.clone(),
                source,
            })?;

        debug!("Spawned worker for {}", name);
        Ok(Self {
            name,
            port,
            readiness,
            shutdown_tx,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the worker's event loop. In-flight requests are dropped.
    pub fn terminate(&self) {
        if self.shutdown_tx.send(()).is_ok() {
            debug!("Sent shutdown to {}", self.name);
        }
    }

    /// Wait for the worker thread and return how its server ended.
    ///
    /// Blocks for as long as the worker's event loop is busy; see
    /// [`Worker::join_timeout`] for a bounded wait.
    pub fn join(mut self) -> Result<(), BackendError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| BackendError::WorkerPanicked(self.name.clone()))?,
            None => Ok(()),
        }
    }

    /// Like [`Worker::join`], but gives up after `timeout`.
    ///
    /// A worker still running by then is detached: its thread is left to
    /// finish on its own and [`BackendError::StopTimeout`] is returned.
    pub fn join_timeout(self, timeout: Duration) -> Result<(), BackendError> {
        self.join_until(Instant::now() + timeout, timeout)
    }

    fn join_until(mut self, deadline: Instant, timeout: Duration) -> Result<(), BackendError> {
        while !self.is_finished() {
            if Instant::now() >= deadline {
                // dropping the handle detaches the thread
                self.handle.take();
                return Err(BackendError::StopTimeout {
                    name: self.name.clone(),
                    timeout,
                });
            }
            thread::sleep(DEFAULT_POLL_INTERVAL);
        }
        self.join()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Owns a group of started workers; terminates and joins all of them on drop.
///
/// Workers that have not stopped within the stop timeout are detached and
/// reported at ERROR level, so a handler stuck in blocking code cannot hold
/// the dropping thread forever.
#[derive(Debug)]
pub struct BackendsGuard {
    workers: Vec<Worker>,
    stop_timeout: Duration,
}

impl BackendsGuard {
    pub fn new(workers: Vec<Worker>) -> Self {
        Self {
            workers,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl Drop for BackendsGuard {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.terminate();
        }
        let deadline = Instant::now() + self.stop_timeout;
        for worker in self.workers.drain(..) {
            let name = worker.name.clone();
            match worker.join_until(deadline, self.stop_timeout) {
                Ok(()) => {}
                Err(e @ BackendError::StopTimeout { .. }) => error!("{}", e),
                Err(e) => warn!("{} stopped with error: {}", name, e),
            }
        }
    }
}
