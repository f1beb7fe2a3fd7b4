use crate::encoder::LOGGER_FIELD;
use crate::hook::InfluxHook;
use crate::record::{FieldValue, Level, LogEntry};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use tokio::runtime::Handle;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Targets whose events are never forwarded: this crate's own diagnostics
/// and the HTTP stack underneath the client. Forwarding them would make
/// every flush produce new entries.
const IGNORED_TARGETS: &[&str] = &[env!("CARGO_CRATE_NAME"), "hyper", "reqwest", "h2", "rustls"];

/// `tracing_subscriber` layer that turns every event into a [`LogEntry`]
/// and fires it at an [`InfluxHook`].
///
/// `on_event` runs on the application thread and must not block, so each
/// entry is fired on a task of the runtime captured at construction.
/// Failures are reported on stderr and counted; they cannot be returned to
/// the code that emitted the event.
pub struct InfluxLayer {
    hook: Arc<InfluxHook>,
    runtime: Handle,
    /// Events seen by the layer, excluding ignored targets.
    pub total_events: Arc<AtomicU64>,
    /// Events whose `fire` returned an error.
    pub failed_events: Arc<AtomicU64>,
}

impl InfluxLayer {
    /// Create a layer firing on the current Tokio runtime.
    pub fn new(hook: Arc<InfluxHook>) -> Result<Self, tokio::runtime::TryCurrentError> {
        Ok(Self::with_handle(hook, Handle::try_current()?))
    }

    pub fn with_handle(hook: Arc<InfluxHook>, runtime: Handle) -> Self {
        Self {
            hook,
            runtime,
            total_events: Arc::new(AtomicU64::new(0)),
            failed_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Map a `tracing` level onto the hook's severities. `TRACE` has no
/// counterpart and is reported as debug.
pub fn map_level(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::ERROR => Level::Error,
        tracing::Level::WARN => Level::Warn,
        tracing::Level::INFO => Level::Info,
        _ => Level::Debug,
    }
}

fn is_ignored(target: &str) -> bool {
    IGNORED_TARGETS.iter().any(|prefix| {
        target == *prefix
            || target
                .strip_prefix(prefix)
                .map_or(false, |rest| rest.starts_with("::"))
    })
}

impl<S> Layer<S> for InfluxLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if is_ignored(meta.target()) {
            return;
        }
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor { fields: &mut fields, message: &mut message };
        event.record(&mut visitor);

        fields
            .entry(LOGGER_FIELD.to_string())
            .or_insert_with(|| FieldValue::Str(meta.target().to_string()));

        let entry = LogEntry {
            level: map_level(meta.level()),
            message: message.unwrap_or_default(),
            timestamp: Utc::now(),
            fields,
        };

        let hook = Arc::clone(&self.hook);
        let failed = Arc::clone(&self.failed_events);
        self.runtime.spawn(async move {
            if let Err(e) = hook.fire(&entry).await {
                failed.fetch_add(1, Ordering::Relaxed);
                eprintln!("failed to deliver log entry: {}", e);
            }
        });
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, FieldValue>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), FieldValue::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), FieldValue::Int(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), FieldValue::UInt(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), FieldValue::Float(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), FieldValue::Bool(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), FieldValue::Str(format!("{:?}", value)));
        }
    }
}
