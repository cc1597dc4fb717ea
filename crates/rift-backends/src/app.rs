//! Out-of-process application launcher.
//!
//! Runs an application as a child process and treats it as started once its
//! output contains the start message. Every output line becomes a
//! [`LogRecord`]: lines written by a JSON `tracing` formatter keep their level
//! and target, other lines are recorded at ERROR (stderr) or INFO (stdout).

use crate::error::BackendError;
use crate::logs::{log_channel, LogRecord, LogSink, LogsStorage};
use regex::Regex;
use std::ffi::{OsStr, OsString};
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Level};

pub const DEFAULT_START_PATTERN: &str = ".*Start serving on.*";
pub const DEFAULT_APP_START_TIMEOUT: Duration = Duration::from_secs(5);
const READER_GRACE: Duration = Duration::from_millis(200);

/// Builder for launching an application and waiting for its start message.
#[derive(Debug, Clone)]
pub struct AppManager {
    name: String,
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    start_timeout: Duration,
    poll_interval: Duration,
    start_pattern: Regex,
}

impl AppManager {
    pub fn new(program: impl AsRef<OsStr>) -> Result<Self, BackendError> {
        let program = program.as_ref().to_os_string();
        Ok(Self {
            name: format!("application {:?}", program),
            program,
            args: Vec::new(),
            envs: Vec::new(),
            start_timeout: DEFAULT_APP_START_TIMEOUT,
            poll_interval: Duration::from_millis(1),
            start_pattern: Regex::new(DEFAULT_START_PATTERN)?,
        })
    }

    /// Name used in thread names and error messages.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// INFO message pattern, matched at the start of the message.
    pub fn start_pattern(mut self, pattern: Regex) -> Self {
        self.start_pattern = pattern;
        self
    }

    /// Spawn the application and wait for its start message.
    ///
    /// On timeout the child is killed and the error lists every ERROR
    /// record captured so far.
    pub fn start(&self) -> Result<AppGuard, BackendError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BackendError::Spawn {
                name: self.name.clone(),
                source,
            })?;
        info!("Spawned {} (pid {})", self.name, child.id());

        let (sink, queue) = log_channel();
        let readers = match self.spawn_readers(&mut child, &sink) {
            Ok(readers) => readers,
            Err(e) => {
                stop_child(&self.name, &mut child);
                return Err(e);
            }
        };
        let mut guard = AppGuard {
            name: self.name.clone(),
            child,
            storage: LogsStorage::new(queue),
            readers,
        };

        let deadline = Instant::now() + self.start_timeout;
        loop {
            if guard.storage.has_info_log_record(&self.start_pattern, true) {
                info!("{} started", self.name);
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(self.poll_interval);
        }

        guard.stop();
        guard.storage.collect_from_queue();
        let errors = guard
            .storage
            .filter_logs(Some(Level::ERROR), None)
            .into_iter()
            .map(|r| r.message.clone())
            .collect();
        warn!("{} did not start within {:?}", self.name, self.start_timeout);
        Err(BackendError::AppStartupTimeout {
            app: self.name.clone(),
            timeout: self.start_timeout,
            errors,
        })
    }

    fn spawn_readers(
        &self,
        child: &mut Child,
        sink: &LogSink,
    ) -> Result<Vec<JoinHandle<()>>, BackendError> {
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(self.spawn_reader("stdout", stdout, Level::INFO, sink.clone())?);
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(self.spawn_reader("stderr", stderr, Level::ERROR, sink.clone())?);
        }
        Ok(readers)
    }

    fn spawn_reader<R: Read + Send + 'static>(
        &self,
        stream: &'static str,
        output: R,
        level: Level,
        sink: LogSink,
    ) -> Result<JoinHandle<()>, BackendError> {
        let name = format!("{} {}", self.name, stream);
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for line in BufReader::new(output).lines() {
                    let Ok(line) = line else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let record = LogRecord::from_json_line(&line)
                        .unwrap_or_else(|| LogRecord::new(level, stream, line));
                    sink.send(record);
                }
            })
            .map_err(|source| BackendError::Spawn { name, source })
    }
}

/// A running application. Killed and reaped on drop.
#[derive(Debug)]
pub struct AppGuard {
    name: String,
    child: Child,
    storage: LogsStorage,
    readers: Vec<JoinHandle<()>>,
}

impl AppGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Records captured from the application's output.
    pub fn logs(&mut self) -> &mut LogsStorage {
        &mut self.storage
    }

    /// Kill the child, then give the output readers a short grace period to
    /// drain the closed pipes. Readers still blocked afterwards are detached.
    fn stop(&mut self) {
        stop_child(&self.name, &mut self.child);
        let deadline = Instant::now() + READER_GRACE;
        while self.readers.iter().any(|r| !r.is_finished()) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        self.readers.clear();
    }
}

impl Drop for AppGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

fn stop_child(name: &str, child: &mut Child) {
    if let Ok(Some(status)) = child.try_wait() {
        debug!("{} already exited with {}", name, status);
        return;
    }
    if let Err(e) = child.kill() {
        debug!("Failed to kill {}: {}", name, e);
    }
    match child.wait() {
        Ok(status) => debug!("{} exited with {}", name, status),
        Err(e) => warn!("Failed to wait for {}: {}", name, e),
    }
}
