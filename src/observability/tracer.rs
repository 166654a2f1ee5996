//! Request spans on the OpenTelemetry SDK.
//!
//! [`Tracer`] wraps an SDK tracer provider. A [`SpanGuard`] owns an SDK span,
//! and the SDK span ends and reaches the provider's processors when it is
//! dropped, so a span closes on normal return, early return, panic unwinding
//! and future cancellation alike.

use std::fmt;

use opentelemetry::trace::{
    Span as _, SpanContext, SpanKind, Status, TraceContextExt, Tracer as _, TracerProvider as _,
};
use opentelemetry::{Context as OtelContext, Key, KeyValue, Value};
use opentelemetry_sdk::export::trace::SpanExporter;
use opentelemetry_sdk::trace::{Span, TracerProvider};
use tracing::warn;

/// Attribute carried by every span of a request.
pub const REQUEST_ID_ATTR: &str = "request_id";

/// Instrumentation scope name of all spans.
const SCOPE_NAME: &str = "microtrace";

/// Opens spans on an SDK provider. Cheap to clone.
#[derive(Clone)]
pub struct Tracer {
    provider: TracerProvider,
    tracer: opentelemetry_sdk::trace::Tracer,
}

impl Tracer {
    pub fn new(provider: TracerProvider) -> Self {
        let tracer = provider.tracer(SCOPE_NAME);
        Self { provider, tracer }
    }

    /// Provider without processors: spans get real ids (so `traceparent`
    /// still propagates) but are dropped when they end.
    pub fn noop() -> Self {
        Self::new(TracerProvider::builder().build())
    }

    /// Hand every span to `exporter` synchronously as it ends.
    pub fn with_exporter<E: SpanExporter + 'static>(exporter: E) -> Self {
        Self::new(
            TracerProvider::builder()
                .with_simple_exporter(exporter)
                .build(),
        )
    }

    /// Open a request's server span as a child of `parent_cx` (the caller's
    /// remote context, or an empty one to start a new trace).
    pub fn start_root_span(
        &self,
        name: impl Into<String>,
        parent_cx: &OtelContext,
        request_id: &str,
    ) -> SpanGuard {
        let span = self
            .tracer
            .span_builder(name.into())
            .with_kind(SpanKind::Server)
            .with_attributes(vec![KeyValue::new(REQUEST_ID_ATTR, request_id.to_string())])
            .start_with_context(&self.tracer, parent_cx);

        SpanGuard {
            span,
            request_id: Some(request_id.to_string()),
        }
    }

    /// Open an internal span. With a parent it joins the parent's trace and
    /// inherits its `request_id`; without one it starts a new trace.
    pub fn start_span(&self, name: impl Into<String>, parent: Option<&SpanGuard>) -> SpanGuard {
        let parent_cx = parent.map(SpanGuard::context).unwrap_or_default();
        let request_id = parent.and_then(|p| p.request_id.clone());

        let mut builder = self
            .tracer
            .span_builder(name.into())
            .with_kind(SpanKind::Internal);
        if let Some(ref id) = request_id {
            builder = builder.with_attributes(vec![KeyValue::new(REQUEST_ID_ATTR, id.clone())]);
        }

        SpanGuard {
            span: builder.start_with_context(&self.tracer, &parent_cx),
            request_id,
        }
    }

    /// Flush and stop the provider's processors.
    pub fn shutdown(&self) {
        if let Err(e) = self.provider.shutdown() {
            warn!(target: "microtrace.tracing", error = %e, "tracer provider shutdown failed");
        }
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

/// An open span. Ends on drop.
pub struct SpanGuard {
    span: Span,
    request_id: Option<String>,
}

impl SpanGuard {
    pub fn span_context(&self) -> &SpanContext {
        self.span.span_context()
    }

    /// 32 lowercase hex chars.
    pub fn trace_id(&self) -> String {
        self.span_context().trace_id().to_string()
    }

    /// 16 lowercase hex chars.
    pub fn span_id(&self) -> String {
        self.span_context().span_id().to_string()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// A context positioned at this span, for children and propagation.
    pub fn context(&self) -> OtelContext {
        OtelContext::new().with_remote_span_context(self.span_context().clone())
    }

    pub fn set_attribute(&mut self, key: impl Into<Key>, value: impl Into<Value>) {
        self.span.set_attribute(KeyValue::new(key, value));
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.span.set_status(Status::error(message.into()));
    }

    pub fn set_ok(&mut self) {
        self.span.set_status(Status::Ok);
    }

    /// End the span now.
    pub fn end(mut self) {
        self.span.end();
    }
}

impl fmt::Debug for SpanGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanGuard")
            .field("trace_id", &self.span_context().trace_id())
            .field("span_id", &self.span_context().span_id())
            .field("request_id", &self.request_id)
            .finish()
    }
}
