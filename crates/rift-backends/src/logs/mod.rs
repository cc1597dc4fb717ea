//! Log capture bridge.
//!
//! Workers emit `tracing` events; a [`QueueLayer`] installed as the worker's
//! default subscriber converts each event into a [`LogRecord`] and sends it
//! through a [`LogSink`]. The controller reads the other end, a [`LogQueue`],
//! through a [`LogsStorage`] that buffers records and answers queries.
//!
//! ```no_run
//! use rift_backends::logs::{log_channel, LogsStorage};
//! use regex::Regex;
//!
//! let (sink, queue) = log_channel();
//! let mut storage = LogsStorage::new(queue);
//! {
//!     let _capture = storage.capture();
//!     // ... drive the backends that log into `sink` ...
//! }
//! assert!(storage.has_info_log_record(&Regex::new("Start serving").unwrap(), false));
//! # drop(sink);
//! ```

mod layer;
mod record;
mod storage;

pub use layer::{capture_into, QueueLayer};
pub use record::LogRecord;
pub use storage::{LogCapture, LogsStorage};

use crossbeam::channel::{self, Receiver, Sender};

/// Producer side of the log queue. Cheap to clone; one per worker.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: Sender<LogRecord>,
}

impl LogSink {
    /// Queue a record. Records sent after every queue handle is dropped are discarded.
    pub fn send(&self, record: LogRecord) {
        let _ = self.tx.send(record);
    }
}

/// Consumer side of the log queue.
#[derive(Debug, Clone)]
pub struct LogQueue {
    rx: Receiver<LogRecord>,
}

impl LogQueue {
    pub fn try_recv(&self) -> Option<LogRecord> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create an unbounded log queue.
pub fn log_channel() -> (LogSink, LogQueue) {
    let (tx, rx) = channel::unbounded();
    (LogSink { tx }, LogQueue { rx })
}
