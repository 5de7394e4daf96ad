//! In-memory capture of tracing events for assertions in tests.
//!
//! The capture subscriber is installed with `set_default`, so it is scoped to
//! the current thread. Async tests that want to observe spawned tasks should
//! run on a current-thread runtime.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// One captured tracing event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Level of the event.
    pub level: Level,
    /// Target module path.
    pub target: String,
    /// The `message` field.
    pub message: String,
    /// All other fields, stringified.
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    /// Value of a named field, if recorded.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Shared handle to everything captured so far.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    /// Snapshot of captured events.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    /// Any event whose message contains `needle`.
    pub fn has_message(&self, needle: &str) -> bool {
        self.events.lock().iter().any(|e| e.message.contains(needle))
    }

    /// Any event at `level` whose message contains `needle`.
    pub fn has_event(&self, level: Level, needle: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }

    /// Number of events at `level`.
    pub fn count_at_level(&self, level: Level) -> usize {
        self.events.lock().iter().filter(|e| e.level == level).count()
    }

    /// Events whose target starts with `prefix`.
    pub fn events_for_target(&self, prefix: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.target.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Drop everything captured so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

struct CaptureLayer {
    logs: CapturedLogs,
}

struct FieldVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn push(&mut self, field: &tracing::field::Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push((field.name().to_owned(), value));
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.push(field, value.to_owned());
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.push(field, value.to_string());
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = FieldVisitor {
            message: String::new(),
            fields: Vec::new(),
        };
        event.record(&mut visitor);

        self.logs.events.lock().push(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_owned(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

/// Install a capturing subscriber for the current thread.
///
/// Keep the returned guard alive for as long as events should be captured.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let layer = CaptureLayer { logs: logs.clone() };

    let subscriber = tracing_subscriber::registry()
        .with(layer)
        .with(LevelFilter::TRACE);

    let guard = subscriber.set_default();
    (logs, guard)
}
