//! Log capture for tests that assert on what the engine reports.
//!
//! Capture is scoped to the calling thread with
//! `tracing::subscriber::with_default`, so parallel tests do not see each
//! other's events.

use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Bounded buffer of captured events; the oldest are dropped first.
#[derive(Debug, Default)]
pub struct LogStorage {
    entries: Vec<LogEntry>,
    max_entries: usize,
}

impl LogStorage {
    #[must_use]
    pub const fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() >= self.max_entries {
            self.entries.remove(0);
        }
        self.entries.push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }
}

/// A layer that records every event into a shared [`LogStorage`].
pub struct CaptureLayer {
    storage: Arc<Mutex<LogStorage>>,
}

impl CaptureLayer {
    #[must_use]
    pub const fn new(storage: Arc<Mutex<LogStorage>>) -> Self {
        Self { storage }
    }
}

struct Visitor<'a> {
    message: &'a mut String,
    fields: &'a mut Vec<(String, String)>,
}

impl tracing::field::Visit for Visitor<'_> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            *self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let value = format!("{value:?}");
        if field.name() == "message" {
            *self.message = value;
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl<S> tracing_subscriber::Layer<S> for CaptureLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();
        let mut message = String::new();
        let mut fields = Vec::new();
        event.record(&mut Visitor {
            message: &mut message,
            fields: &mut fields,
        });
        self.storage.lock().push(LogEntry {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message,
            fields,
        });
    }
}

/// Runs `f` with events at `filter` or above captured, returning its result
/// and the captured events.
pub fn capture<T>(filter: &str, f: impl FnOnce() -> T) -> (T, Vec<LogEntry>) {
    let storage = Arc::new(Mutex::new(LogStorage::new(10_000)));
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(CaptureLayer::new(Arc::clone(&storage)));
    let result = tracing::subscriber::with_default(subscriber, f);
    let entries = storage.lock().entries().to_vec();
    (result, entries)
}

/// Renders captured events for assertion failure messages.
#[must_use]
pub fn format_logs(entries: &[LogEntry]) -> String {
    if entries.is_empty() {
        return String::from("no events captured");
    }
    let mut out = format!("{} captured events:\n", entries.len());
    for entry in entries {
        let _ = writeln!(out, "[{}] {}: {}", entry.level, entry.target, entry.message);
        for (key, value) in &entry.fields {
            let _ = writeln!(out, "    {key} = {value}");
        }
    }
    out
}

/// Asserts that `entries` hold an event at `level` whose message contains
/// `message`.
#[macro_export]
macro_rules! assert_logged {
    ($entries:expr, $level:expr, $message:expr) => {{
        let entries = &$entries;
        assert!(
            entries
                .iter()
                .any(|e| e.level == $level && e.message.contains($message)),
            "expected a {} event containing '{}'\n{}",
            $level,
            $message,
            $crate::test_utils::logging::format_logs(entries)
        );
    }};
}
