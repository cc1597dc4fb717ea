use super::{LogQueue, LogRecord};
use regex::Regex;
use std::ops::{Deref, DerefMut};
use std::thread;
use std::time::{Duration, Instant};
use tracing::Level;

/// Local buffer over a [`LogQueue`].
///
/// Prefer [`LogsStorage::capture`] in tests: it discards records queued before
/// the scope began and collects everything queued by the time it ends.
#[derive(Debug)]
pub struct LogsStorage {
    queue: LogQueue,
    records: Vec<LogRecord>,
}

impl LogsStorage {
    pub fn new(queue: LogQueue) -> Self {
        Self {
            queue,
            records: Vec::new(),
        }
    }

    /// Drop everything currently queued.
    pub fn clear_logs_queue(&self) {
        while self.queue.try_recv().is_some() {}
    }

    /// Empty the local buffer. The queue is left alone.
    pub fn clear_logs_storage(&mut self) {
        self.records.clear();
    }

    /// Move every queued record into the buffer.
    pub fn collect_from_queue(&mut self) {
        while let Some(record) = self.queue.try_recv() {
            self.records.push(record);
        }
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Buffered records with the given level and/or target, in arrival order.
    pub fn filter_logs(&self, level: Option<Level>, target: Option<&str>) -> Vec<&LogRecord> {
        self.records
            .iter()
            .filter(|r| level.is_none_or(|l| r.level == l))
            .filter(|r| target.is_none_or(|t| r.target == t))
            .collect()
    }

    /// Whether a buffered record at `level` has a message matching `pattern`
    /// at its start. With `collect_first`, the queue is drained into the buffer beforehand.
    pub fn has_log_record(&mut self, pattern: &Regex, level: Level, collect_first: bool) -> bool {
        if collect_first {
            self.collect_from_queue();
        }
        self.filter_logs(Some(level), None)
            .iter()
            .any(|r| matches_at_start(pattern, &r.message))
    }

    pub fn has_info_log_record(&mut self, pattern: &Regex, collect_first: bool) -> bool {
        self.has_log_record(pattern, Level::INFO, collect_first)
    }

    pub fn has_error_log_record(&mut self, pattern: &Regex, collect_first: bool) -> bool {
        self.has_log_record(pattern, Level::ERROR, collect_first)
    }

    pub fn has_warning_log_record(&mut self, pattern: &Regex, collect_first: bool) -> bool {
        self.has_log_record(pattern, Level::WARN, collect_first)
    }

    /// Poll the queue until a matching record shows up or `timeout` elapses.
    pub fn wait_for_log_record(
        &mut self,
        pattern: &Regex,
        level: Level,
        timeout: Duration,
        poll_interval: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.has_log_record(pattern, level, true) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(poll_interval);
        }
    }

    /// Start a capture scope: stale queued records are dropped now, and the
    /// queue is collected once more when the returned guard goes out of scope.
    pub fn capture(&mut self) -> LogCapture<'_> {
        self.clear_logs_queue();
        LogCapture { storage: self }
    }
}

fn matches_at_start(pattern: &Regex, message: &str) -> bool {
    pattern.find(message).is_some_and(|m| m.start() == 0)
}

/// Scope guard returned by [`LogsStorage::capture`].
#[derive(Debug)]
pub struct LogCapture<'a> {
    storage: &'a mut LogsStorage,
}

impl Deref for LogCapture<'_> {
    type Target = LogsStorage;

    fn deref(&self) -> &Self::Target {
        self.storage
    }
}

impl DerefMut for LogCapture<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.storage
    }
}

impl Drop for LogCapture<'_> {
    fn drop(&mut self) {
        self.storage.collect_from_queue();
    }
}
