//! Root span middleware.
//!
//! Opens one server span per request, positioned by the inbound
//! `traceparent` when there is one, and closes it on the way out with the
//! response status. Paths in the exclusion list are not traced.

use async_trait::async_trait;
use opentelemetry_semantic_conventions::trace::{
    CLIENT_ADDRESS, HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, HTTP_ROUTE, URL_PATH,
};

use super::{Middleware, MiddlewareResult};
use crate::config::TracingConfig;
use crate::core::{Context, Request, Response};
use crate::observability::{extract_context, inject_context, Tracer};

pub struct TracingMiddleware {
    tracer: Tracer,
    config: TracingConfig,
}

impl TracingMiddleware {
    pub fn new(tracer: Tracer, config: TracingConfig) -> Self {
        Self { tracer, config }
    }
}

#[async_trait]
impl Middleware for TracingMiddleware {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn priority(&self) -> i32 {
        -90 // After request_id so the span carries it
    }

    async fn on_request(&self, req: Request, ctx: &mut Context) -> MiddlewareResult {
        if self.config.is_excluded(&ctx.path) {
            return MiddlewareResult::Next(req);
        }

        let parent_cx = extract_context(req.headers());
        let mut span = self.tracer.start_root_span(
            format!("{} {}", ctx.method, ctx.route),
            &parent_cx,
            &ctx.request_id,
        );
        span.set_attribute(HTTP_REQUEST_METHOD, ctx.method.clone());
        span.set_attribute(HTTP_ROUTE, ctx.route.clone());
        span.set_attribute(URL_PATH, ctx.path.clone());
        span.set_attribute(CLIENT_ADDRESS, ctx.client_ip.to_string());

        ctx.set_log_trace(&span.trace_id(), &span.span_id());
        ctx.set_span(span);

        MiddlewareResult::Next(req)
    }

    fn on_response(&self, mut res: Response, ctx: &mut Context) -> Response {
        let Some(mut span) = ctx.take_span() else {
            return res;
        };

        let status = res.status();
        span.set_attribute(HTTP_RESPONSE_STATUS_CODE, i64::from(status.as_u16()));
        if status.is_server_error() {
            span.set_error(status.to_string());
        } else {
            span.set_ok();
        }

        inject_context(res.headers_mut(), &span.context());
        span.end();
        res
    }
}
