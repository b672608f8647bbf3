//! Telemetry channel between a worker and its supervisor
//!
//! The worker installs a [`TelemetryLayer`] that serializes tracing events
//! as newline-delimited [`TelemetryEvent`]s on its stderr. The supervisor
//! reads them back with [`forward_telemetry`] and hands them to a
//! [`TelemetrySink`], by default one that replays logs through the
//! caller's tracing subscriber and draws a progress line.

use crate::config::{LogLevel, TelemetryMode};
use crate::crawler::PROGRESS_TARGET;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Tracing target of replayed worker logs
pub const WORKER_TARGET: &str = "trawl::worker";

/// Crates whose logs are silenced in progress mode
const NOISY_CRATES: &[&str] = &[
    "hyper",
    "reqwest",
    "html5ever",
    "selectors",
    "chromiumoxide",
    "rusqlite",
];

/// A primitive structured field value
///
/// Variants are tried in order when decoding, so non-negative integers come
/// back as `UInt` and only negative ones as `Int`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::UInt(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "{}", v),
        }
    }
}

/// One line on the telemetry channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TelemetryEvent {
    Log {
        level: LogLevel,
        target: String,
        message: String,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        fields: BTreeMap<String, FieldValue>,
    },
    #[serde(rename_all = "kebab-case")]
    Progress {
        pages_fetched: u64,
        errors: u64,
        items_scraped: u64,
    },
}

/// Collects the message and fields of a tracing event
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: BTreeMap<String, FieldValue>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: FieldValue) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }

    fn count(&self, name: &str) -> u64 {
        match self.fields.get(name) {
            Some(FieldValue::UInt(v)) => *v,
            Some(FieldValue::Int(v)) => (*v).max(0) as u64,
            _ => 0,
        }
    }
}

impl Visit for FieldVisitor {
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, FieldValue::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, FieldValue::Int(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, FieldValue::UInt(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, FieldValue::Float(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, FieldValue::Str(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, FieldValue::Str(format!("{:?}", value)));
    }
}

/// A tracing layer writing telemetry events to `W`
pub struct TelemetryLayer<W> {
    writer: Mutex<W>,
    mode: TelemetryMode,
}

impl<W: Write> TelemetryLayer<W> {
    pub fn new(writer: W, mode: TelemetryMode) -> Self {
        Self {
            writer: Mutex::new(writer),
            mode,
        }
    }

    fn wants(&self, event: &Event<'_>) -> bool {
        let metadata = event.metadata();
        let is_progress = metadata.target() == PROGRESS_TARGET;

        match self.mode {
            TelemetryMode::Off => false,
            TelemetryMode::Progress => is_progress,
            TelemetryMode::Logs { level } => !is_progress && *metadata.level() <= level.to_tracing(),
        }
    }

    fn write(&self, event: &TelemetryEvent) {
        let Ok(mut writer) = self.writer.lock() else {
            return;
        };

        // A closed channel means the supervisor is gone; nothing to report to
        if serde_json::to_writer(&mut *writer, event).is_ok() {
            let _ = writer.write_all(b"\n");
            let _ = writer.flush();
        }
    }
}

impl<S, W> Layer<S> for TelemetryLayer<W>
where
    S: Subscriber,
    W: Write + Send + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.wants(event) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let telemetry = if metadata.target() == PROGRESS_TARGET {
            TelemetryEvent::Progress {
                pages_fetched: visitor.count("pages_fetched"),
                errors: visitor.count("errors"),
                items_scraped: visitor.count("items_scraped"),
            }
        } else {
            TelemetryEvent::Log {
                level: LogLevel::from_tracing(metadata.level()),
                target: metadata.target().to_string(),
                message: visitor.message.unwrap_or_default(),
                timestamp: Utc::now(),
                fields: visitor.fields,
            }
        };

        self.write(&telemetry);
    }
}

/// The worker's event filter for a telemetry mode
pub fn worker_filter(mode: TelemetryMode) -> EnvFilter {
    match mode {
        TelemetryMode::Off => EnvFilter::new("off"),
        TelemetryMode::Logs { level } => EnvFilter::new(level.as_str()),
        TelemetryMode::Progress => {
            let mut directives = vec!["warn".to_string(), format!("{}=info", PROGRESS_TARGET)];
            directives.extend(NOISY_CRATES.iter().map(|c| format!("{}=off", c)));
            EnvFilter::new(directives.join(","))
        }
    }
}

/// Receives telemetry read from a worker
pub trait TelemetrySink: Send {
    fn event(&mut self, event: TelemetryEvent);

    /// A line that is not a telemetry event, such as a panic message
    fn raw(&mut self, line: &str);

    /// Called once the channel is closed
    fn finish(&mut self) {}
}

/// Collects events in memory
impl TelemetrySink for Vec<TelemetryEvent> {
    fn event(&mut self, event: TelemetryEvent) {
        self.push(event);
    }

    fn raw(&mut self, line: &str) {
        self.push(TelemetryEvent::Log {
            level: LogLevel::Warn,
            target: WORKER_TARGET.to_string(),
            message: line.to_string(),
            timestamp: Utc::now(),
            fields: BTreeMap::new(),
        });
    }
}

/// Replays logs through tracing and draws progress on stderr
#[derive(Debug, Default)]
pub struct TracingSink {
    progress_drawn: bool,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn end_progress_line(&mut self) {
        if self.progress_drawn {
            eprintln!();
            self.progress_drawn = false;
        }
    }
}

impl TelemetrySink for TracingSink {
    fn event(&mut self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::Log {
                level,
                target,
                message,
                fields,
                ..
            } => {
                self.end_progress_line();
                replay_log(level, &target, &message, &fields);
            }
            TelemetryEvent::Progress {
                pages_fetched,
                errors,
                items_scraped,
            } => {
                eprint!(
                    "\rScraping: {} items, {} pages, {} errors",
                    items_scraped, pages_fetched, errors
                );
                self.progress_drawn = true;
            }
        }
    }

    fn raw(&mut self, line: &str) {
        self.end_progress_line();
        tracing::warn!(target: WORKER_TARGET, "{}", line);
    }

    fn finish(&mut self) {
        self.end_progress_line();
    }
}

fn replay_log(level: LogLevel, target: &str, message: &str, fields: &BTreeMap<String, FieldValue>) {
    let fields: String = fields
        .iter()
        .map(|(k, v)| format!(" {}={}", k, v))
        .collect();

    match level {
        LogLevel::Error => tracing::error!(target: WORKER_TARGET, origin = target, "{}{}", message, fields),
        LogLevel::Warn => tracing::warn!(target: WORKER_TARGET, origin = target, "{}{}", message, fields),
        LogLevel::Info => tracing::info!(target: WORKER_TARGET, origin = target, "{}{}", message, fields),
        LogLevel::Debug => tracing::debug!(target: WORKER_TARGET, origin = target, "{}{}", message, fields),
        LogLevel::Trace => tracing::trace!(target: WORKER_TARGET, origin = target, "{}{}", message, fields),
    }
}

/// Reads telemetry lines until the channel closes
///
/// Events reach the sink in the order the worker wrote them. Returns the
/// number of lines read.
pub async fn forward_telemetry<R>(reader: R, sink: &mut dyn TelemetrySink) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut count = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        count += 1;

        match serde_json::from_str::<TelemetryEvent>(&line) {
            Ok(event) => sink.event(event),
            Err(_) => sink.raw(&line),
        }
    }

    sink.finish();
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture(mode: TelemetryMode, emit: impl FnOnce()) -> Vec<u8> {
        let buf = SharedBuf::default();
        let subscriber =
            tracing_subscriber::registry().with(TelemetryLayer::new(buf.clone(), mode));
        tracing::subscriber::with_default(subscriber, emit);
        let bytes = buf.0.lock().unwrap().clone();
        bytes
    }

    async fn replay(bytes: &[u8]) -> Vec<TelemetryEvent> {
        let mut events = Vec::new();
        forward_telemetry(bytes, &mut events).await.unwrap();
        events
    }

    #[tokio::test]
    async fn test_log_events_keep_order_and_fields() {
        let bytes = capture(
            TelemetryMode::Logs {
                level: LogLevel::Info,
            },
            || {
                tracing::info!(target: "trawl::test", url = "https://a.test/", status = 200u64, "first");
                tracing::debug!(target: "trawl::test", "filtered out");
                tracing::warn!(target: "trawl::test", "second");
                tracing::error!(target: "trawl::test", retry = true, "third");
            },
        );

        let events = replay(&bytes).await;
        let messages: Vec<(LogLevel, String)> = events
            .iter()
            .map(|e| match e {
                TelemetryEvent::Log { level, message, .. } => (*level, message.clone()),
                other => panic!("unexpected {:?}", other),
            })
            .collect();

        assert_eq!(
            messages,
            vec![
                (LogLevel::Info, "first".to_string()),
                (LogLevel::Warn, "second".to_string()),
                (LogLevel::Error, "third".to_string()),
            ]
        );

        let TelemetryEvent::Log { fields, target, .. } = &events[0] else {
            panic!("expected log");
        };
        assert_eq!(target, "trawl::test");
        assert_eq!(fields["url"], FieldValue::Str("https://a.test/".into()));
        assert_eq!(fields["status"], FieldValue::UInt(200));
    }

    #[test]
    fn test_integer_fields_keep_sign_and_range() {
        let decode = |json: &str| serde_json::from_str::<FieldValue>(json).unwrap();

        assert_eq!(decode("18446744073709551615"), FieldValue::UInt(u64::MAX));
        assert_eq!(decode("7"), FieldValue::UInt(7));
        assert_eq!(decode("-7"), FieldValue::Int(-7));
        assert_eq!(decode("1.5"), FieldValue::Float(1.5));
        assert_eq!(decode("true"), FieldValue::Bool(true));
    }

    #[tokio::test]
    async fn test_progress_mode_only_forwards_progress() {
        let bytes = capture(TelemetryMode::Progress, || {
            tracing::warn!("not forwarded");
            for n in 1..=3u64 {
                tracing::info!(
                    target: PROGRESS_TARGET,
                    pages_fetched = n,
                    errors = 0u64,
                    items_scraped = n - 1,
                    "progress"
                );
            }
        });

        let events = replay(&bytes).await;
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[2],
            TelemetryEvent::Progress {
                pages_fetched: 3,
                errors: 0,
                items_scraped: 2
            }
        );
    }

    #[tokio::test]
    async fn test_off_mode_forwards_nothing() {
        let bytes = capture(TelemetryMode::Off, || tracing::error!("dropped"));
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_raw_lines_become_warnings() {
        let input = b"{\"event\":\"progress\",\"pages-fetched\":1,\"errors\":0,\"items-scraped\":0}\nthread 'main' panicked at src/main.rs\n";
        let events = replay(input).await;

        assert_eq!(events.len(), 2);
        match &events[1] {
            TelemetryEvent::Log { level, message, .. } => {
                assert_eq!(*level, LogLevel::Warn);
                assert!(message.contains("panicked"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_event_schema() {
        let event = TelemetryEvent::Progress {
            pages_fetched: 4,
            errors: 1,
            items_scraped: 2,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"event": "progress", "pages-fetched": 4, "errors": 1, "items-scraped": 2})
        );
    }
}
