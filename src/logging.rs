//! Structured JSON logging.
//!
//! Log format, one record per line:
//! ```json
//! {"ts":"2024-12-28T15:04:05.123Z","level":"info","logger":"microtrace.request","msg":"request_completed","ctx":{"service":"microtrace","request_id":"demo-123"},"data":{"status_code":200}}
//! ```
//!
//! Correlation works through `tracing` spans: the pipeline runs every request
//! inside a `request` span, [`CorrelationLayer`] keeps that span's
//! `request_id`/`trace_id`/`span_id` in its extensions and [`JsonFormatter`]
//! copies them into `ctx` for any event emitted within.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

const DEFAULT_FILTER: &str = "microtrace=info";

/// Target used by [`emit`]; the logger name travels in a field.
const EMIT_TARGET: &str = "microtrace";

/// Install the global subscriber: env filter, correlation layer and JSON
/// formatter on stdout.
pub fn init(config: &LoggingConfig) {
    let subscriber = subscriber(&config.filter, &config.service_name, std::io::stdout);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: global logger already installed");
    }
}

/// Build the subscriber stack writing to `writer`.
pub fn subscriber<W>(filter: &str, service_name: &str, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(CorrelationLayer)
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(JsonFormatter::new(service_name))
                .with_writer(writer),
        )
}

/// Emit one structured record under an arbitrary logger name.
///
/// `fields` should be a JSON object; its entries land in `data`.
pub fn emit(level: Level, logger: &str, msg: &str, fields: Value) {
    macro_rules! emit_at {
        ($lvl:expr) => {
            tracing::event!(target: EMIT_TARGET, $lvl, logger = logger, fields = %fields, "{}", msg)
        };
    }

    match level {
        Level::ERROR => emit_at!(Level::ERROR),
        Level::WARN => emit_at!(Level::WARN),
        Level::INFO => emit_at!(Level::INFO),
        Level::DEBUG => emit_at!(Level::DEBUG),
        _ => emit_at!(Level::TRACE),
    }
}

/// Current UTC time as `2024-01-15T10:30:00.123Z`.
pub fn timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format_timestamp(now)
}

fn format_timestamp(since_epoch: Duration) -> String {
    let secs = since_epoch.as_secs();
    let day_secs = secs % 86_400;
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year,
        month,
        day,
        day_secs / 3600,
        (day_secs % 3600) / 60,
        day_secs % 60,
        since_epoch.subsec_millis()
    )
}

/// Days since 1970-01-01 to (year, month, day), proleptic Gregorian.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

// ============================================================================
// Correlation
// ============================================================================

/// Correlation ids captured from span fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Correlation {
    pub request_id: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
}

impl Correlation {
    fn is_empty(&self) -> bool {
        self.request_id.is_none() && self.trace_id.is_none() && self.span_id.is_none()
    }

    fn set(&mut self, name: &str, value: String) {
        match name {
            "request_id" => self.request_id = Some(value),
            "trace_id" => self.trace_id = Some(value),
            "span_id" => self.span_id = Some(value),
            _ => {}
        }
    }
}

impl Visit for Correlation {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.set(field.name(), format!("{:?}", value).trim_matches('"').to_string());
    }
}

/// Stores correlation fields of spans in their extensions, including values
/// recorded after the span was created.
pub struct CorrelationLayer;

impl<S> Layer<S> for CorrelationLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut correlation = Correlation::default();
        attrs.record(&mut correlation);
        if correlation.is_empty() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(correlation);
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<Correlation>() {
            Some(correlation) => values.record(correlation),
            None => {
                let mut correlation = Correlation::default();
                values.record(&mut correlation);
                if !correlation.is_empty() {
                    extensions.insert(correlation);
                }
            }
        }
    }
}

// ============================================================================
// Formatter
// ============================================================================

/// Custom JSON formatter for tracing.
pub struct JsonFormatter {
    service_name: String,
}

impl JsonFormatter {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        let level = match *meta.level() {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let logger = visitor
            .logger
            .take()
            .unwrap_or_else(|| meta.target().replace("::", "."));

        // Innermost span wins per field
        let mut correlation = Correlation::default();
        if let Some(scope) = ctx.event_scope() {
            for span in scope {
                let extensions = span.extensions();
                if let Some(found) = extensions.get::<Correlation>() {
                    if correlation.request_id.is_none() {
                        correlation.request_id = found.request_id.clone();
                    }
                    if correlation.trace_id.is_none() {
                        correlation.trace_id = found.trace_id.clone();
                    }
                    if correlation.span_id.is_none() {
                        correlation.span_id = found.span_id.clone();
                    }
                }
            }
        }

        let mut log_ctx = Map::new();
        log_ctx.insert("service".into(), Value::from(self.service_name.as_str()));
        if let Some(id) = correlation.request_id {
            log_ctx.insert("request_id".into(), Value::from(id));
        }
        if let Some(id) = correlation.trace_id {
            log_ctx.insert("trace_id".into(), Value::from(id));
        }
        if let Some(id) = correlation.span_id {
            log_ctx.insert("span_id".into(), Value::from(id));
        }

        let entry = serde_json::json!({
            "ts": timestamp(),
            "level": level,
            "logger": logger,
            "msg": visitor.message.unwrap_or_default(),
            "ctx": log_ctx,
            "data": visitor.fields,
        });

        writeln!(
            writer,
            "{}",
            serde_json::to_string(&entry).unwrap_or_default()
        )
    }
}

/// Field visitor for collecting event fields.
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    logger: Option<String>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{:?}", value);
        match field.name() {
            "message" => self.message = Some(rendered.trim_matches('"').to_string()),
            "logger" => self.logger = Some(rendered.trim_matches('"').to_string()),
            "fields" => match serde_json::from_str::<Value>(&rendered) {
                Ok(Value::Object(map)) => self.fields.extend(map),
                _ => self.insert("fields", Value::String(rendered)),
            },
            name => self.insert(name, Value::String(rendered)),
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "logger" => self.logger = Some(value.to_string()),
            name => self.insert(name, Value::String(value.to_string())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field.name(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field.name(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field.name(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field.name(), Value::from(value));
    }
}
