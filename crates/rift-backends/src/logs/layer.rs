use super::{LogRecord, LogSink};
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// `tracing` layer relaying every event into a [`LogSink`].
#[derive(Debug, Clone)]
pub struct QueueLayer {
    sink: LogSink,
}

impl QueueLayer {
    pub fn new(sink: LogSink) -> Self {
        Self { sink }
    }
}

impl<S: Subscriber> Layer<S> for QueueLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut record = LogRecord::new(*metadata.level(), metadata.target(), "");
        event.record(&mut RecordVisitor {
            record: &mut record,
        });
        self.sink.send(record);
    }
}

struct RecordVisitor<'a> {
    record: &'a mut LogRecord,
}

impl Visit for RecordVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.store(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.store(field, format!("{value:?}"));
    }
}

impl RecordVisitor<'_> {
    fn store(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.record.message = value;
        } else {
            self.record.fields.insert(field.name().to_string(), value);
        }
    }
}

/// Route all events emitted on the current thread into `sink` until the guard drops.
///
/// Workers call this first thing, so everything their event loop logs reaches
/// the controller. DEBUG and above are captured.
pub fn capture_into(sink: LogSink) -> DefaultGuard {
    let subscriber = tracing_subscriber::registry()
        .with(QueueLayer::new(sink).with_filter(LevelFilter::DEBUG));
    tracing::subscriber::set_default(subscriber)
}
