//! Access logging and request metrics middleware.
//!
//! Records every completed request exactly once: one
//! `microtrace_requests_total` increment, one latency observation, an
//! `microtrace_errors_total` increment for failed requests, and a
//! structured `request_completed` log record.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Middleware, ERROR_KIND_KEY};
use crate::core::{Context, Response};
use crate::observability::Metrics;

/// Error kind recorded for 4xx/5xx responses that carry no explicit kind.
const STATUS_ERROR_KIND: &str = "status";

pub struct AccessLogMiddleware {
    metrics: Arc<Metrics>,
}

impl AccessLogMiddleware {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl Middleware for AccessLogMiddleware {
    fn name(&self) -> &'static str {
        "access_log"
    }

    fn priority(&self) -> i32 {
        -80 // Run early for requests, late for responses
    }

    fn on_response(&self, res: Response, ctx: &mut Context) -> Response {
        let elapsed = ctx.elapsed();
        let status = res.status();
        ctx.status = Some(status.as_u16());

        self.metrics
            .record(&ctx.method, &ctx.route, status.as_u16(), elapsed.as_secs_f64());

        let kind = ctx.get::<&'static str>(ERROR_KIND_KEY).copied();
        match kind {
            Some(kind) => self.metrics.record_error(&ctx.method, &ctx.route, kind),
            None if status.is_server_error() => {
                self.metrics
                    .record_error(&ctx.method, &ctx.route, STATUS_ERROR_KIND)
            }
            None => {}
        }

        let elapsed_ms = (elapsed.as_secs_f64() * 1_000_000.0).round() / 1000.0;
        tracing::info!(
            target: "microtrace.request",
            method = %ctx.method,
            route = %ctx.route,
            path = %ctx.path,
            status_code = status.as_u16(),
            elapsed_ms = elapsed_ms,
            client_ip = %ctx.client_ip,
            error_kind = kind,
            "request_completed"
        );

        res
    }
}
