//! Tracing setup and the live log stream.
//!
//! [LiveLogLayer] republishes every event that carries a `library` field as a
//! [LogLine] on a broadcast channel, so a streaming surface can follow one
//! library's scan in near real time. Publishing never blocks and is dropped
//! when nobody is listening.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{Config, LogFormat};

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "shelfkeeper=info";

/// One progress/diagnostic line tagged with its library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: String,
    pub level: String,
    pub library: String,
    pub message: String,
    pub fields: Option<JsonValue>,
}

/// Handle to the live log stream.
#[derive(Debug, Clone)]
pub struct LiveLog {
    tx: broadcast::Sender<LogLine>,
}

impl LiveLog {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
        self.tx.subscribe()
    }

    /// Tracing layer publishing into this stream.
    pub fn layer(&self, min_level: Level) -> LiveLogLayer {
        LiveLogLayer {
            min_level,
            tx: self.tx.clone(),
        }
    }
}

/// Tracing layer that forwards library-tagged events to a [LiveLog].
#[derive(Clone)]
pub struct LiveLogLayer {
    min_level: Level,
    tx: broadcast::Sender<LogLine>,
}

struct FieldVisitor {
    fields: HashMap<String, JsonValue>,
    message: Option<String>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            fields: HashMap::new(),
            message: None,
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let value_str = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(value_str);
        } else {
            self.fields
                .insert(field.name().to_string(), JsonValue::String(value_str));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(
                field.name().to_string(),
                JsonValue::String(value.to_string()),
            );
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), JsonValue::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), JsonValue::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), JsonValue::Bool(value));
    }
}

impl<S> Layer<S> for LiveLogLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > self.min_level || self.tx.receiver_count() == 0 {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        let library = match visitor.fields.remove("library") {
            Some(JsonValue::String(library)) => library,
            Some(other) => other.to_string(),
            None => return,
        };

        let fields = if visitor.fields.is_empty() {
            None
        } else {
            serde_json::to_value(&visitor.fields).ok()
        };

        let _ = self.tx.send(LogLine {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: level.as_str().to_string(),
            library,
            message: visitor.message.unwrap_or_default(),
            fields,
        });
    }
}

/// Install the global subscriber: env filter, console output and the live log layer.
pub fn init_tracing(config: &Config) -> LiveLog {
    let live_log = LiveLog::new(config.live_log_capacity);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(live_log.layer(Level::INFO));

    let result = match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    if let Err(e) = result {
        eprintln!("Tracing already initialized: {e}");
    }

    live_log
}
