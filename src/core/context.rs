//! Request context for middleware pipeline.

use std::any::Any;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::Request;
use crate::observability::SpanGuard;

/// Request context shared across middleware and handlers.
///
/// Created when the request enters the pipeline and owned by that request
/// alone. Carries:
/// - Correlation id
/// - Timing and final status
/// - The root span and the `tracing` span that scopes log records
/// - Custom key-value storage for middleware communication
pub struct Context {
    /// Client IP address.
    pub client_ip: IpAddr,

    /// Correlation id. Empty until the request id stage has run.
    pub request_id: String,

    /// HTTP method.
    pub method: String,

    /// Route template used as the metrics label (e.g. `/analyze`).
    pub route: String,

    /// Raw request path.
    pub path: String,

    /// Request start time.
    pub started_at: Instant,

    /// Final status, set on the way out.
    pub status: Option<u16>,

    /// Root span of the request, if it is traced.
    span: Option<SpanGuard>,

    /// Log scope; every record emitted inside it carries `request_id`.
    log_span: tracing::Span,

    /// Custom key-value storage for middleware.
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Context {
    /// Create a context for `req` resolved to `route`.
    pub fn new(client_ip: IpAddr, req: &Request, route: impl Into<String>) -> Self {
        let route = route.into();
        // Error level keeps the correlation scope alive under any filter.
        let log_span = tracing::error_span!(
            target: "microtrace.request",
            "request",
            request_id = tracing::field::Empty,
            trace_id = tracing::field::Empty,
            span_id = tracing::field::Empty,
            method = %req.method(),
            route = %route,
        );

        Self {
            client_ip,
            request_id: String::new(),
            method: req.method().to_string(),
            route,
            path: req.path().to_string(),
            started_at: Instant::now(),
            status: None,
            span: None,
            log_span,
            values: HashMap::new(),
        }
    }

    /// Bind the correlation id to this request and its log scope.
    pub fn set_request_id(&mut self, request_id: String) {
        self.log_span.record("request_id", request_id.as_str());
        self.request_id = request_id;
    }

    /// Attach the root span's trace position to the log scope.
    pub fn set_log_trace(&self, trace_id: &str, span_id: &str) {
        self.log_span.record("trace_id", trace_id);
        self.log_span.record("span_id", span_id);
    }

    #[inline]
    pub fn log_span(&self) -> &tracing::Span {
        &self.log_span
    }

    #[inline]
    pub fn span(&self) -> Option<&SpanGuard> {
        self.span.as_ref()
    }

    #[inline]
    pub fn span_mut(&mut self) -> Option<&mut SpanGuard> {
        self.span.as_mut()
    }

    #[inline]
    pub fn set_span(&mut self, span: SpanGuard) {
        self.span = Some(span);
    }

    /// Detach the root span, typically to close it.
    #[inline]
    pub fn take_span(&mut self) -> Option<SpanGuard> {
        self.span.take()
    }

    /// Set a custom value.
    #[inline]
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.values.insert(key.to_string(), Box::new(value));
    }

    /// Get a custom value.
    #[inline]
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref())
    }

    /// Remove a custom value.
    #[inline]
    pub fn remove<T: 'static>(&mut self, key: &str) -> Option<T> {
        self.values
            .remove(key)
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Get elapsed time since request started.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Get elapsed time in milliseconds.
    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("client_ip", &self.client_ip)
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("route", &self.route)
            .field("traced", &self.span.is_some())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
