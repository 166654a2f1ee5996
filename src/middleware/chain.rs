//! Middleware chain for composing multiple middleware.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::Instrument;

use super::{Middleware, MiddlewareResult, ERROR_KIND_KEY};
use crate::core::{Context, Request, Response};
use crate::handler::{Handler, HandlerError};

/// A chain of middleware that processes requests and responses in order.
///
/// Middleware are executed in priority order for requests (lowest first)
/// and in reverse order for responses.
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    /// Add a middleware to the chain.
    ///
    /// Middleware are automatically sorted by priority (stable for ties).
    pub fn add<M: Middleware + 'static>(self, middleware: M) -> Self {
        self.add_arc(Arc::new(middleware))
    }

    /// Add a middleware wrapped in Arc to the chain.
    pub fn add_arc(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self.middlewares.sort_by_key(|m| m.priority());
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Get middleware names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    /// Run one request through the whole pipeline.
    ///
    /// Stages enter in order, the handler runs, then every stage that
    /// entered exits in reverse order exactly once. Handler errors and
    /// panics become error responses; this method always produces a
    /// response. The whole run happens inside the context's log span.
    pub async fn process(&self, req: Request, ctx: &mut Context, handler: &dyn Handler) -> Response {
        let span = ctx.log_span().clone();
        self.run(req, ctx, handler).instrument(span).await
    }

    async fn run(&self, req: Request, ctx: &mut Context, handler: &dyn Handler) -> Response {
        let (entered, outcome) = self.process_request(req, ctx).await;
        let res = match outcome {
            MiddlewareResult::Next(req) => dispatch(req, ctx, handler).await,
            MiddlewareResult::Stop(res) => res,
        };
        self.process_response(res, ctx, entered)
    }

    /// Run `on_request` stages. Returns how many stages entered, including
    /// one that short-circuited.
    async fn process_request(&self, mut req: Request, ctx: &mut Context) -> (usize, MiddlewareResult) {
        for (i, mw) in self.middlewares.iter().enumerate() {
            match mw.on_request(req, ctx).await {
                MiddlewareResult::Next(r) => req = r,
                MiddlewareResult::Stop(res) => {
                    tracing::debug!(
                        target: "microtrace.request",
                        middleware = mw.name(),
                        status = %res.status(),
                        "middleware short-circuited request"
                    );
                    return (i + 1, MiddlewareResult::Stop(res));
                }
            }
        }
        (self.middlewares.len(), MiddlewareResult::Next(req))
    }

    /// Run `on_response` for the first `entered` stages, in reverse.
    fn process_response(&self, mut res: Response, ctx: &mut Context, entered: usize) -> Response {
        for mw in self.middlewares[..entered].iter().rev() {
            res = mw.on_response(res, ctx);
        }
        res
    }
}

/// Call the handler, converting errors and panics into responses.
async fn dispatch(req: Request, ctx: &mut Context, handler: &dyn Handler) -> Response {
    let outcome = AssertUnwindSafe(handler.handle(req, ctx)).catch_unwind().await;

    match outcome {
        Ok(Ok(res)) => res,
        Ok(Err(err)) => {
            match &err {
                HandlerError::Fault(_) => tracing::error!(
                    target: "microtrace.request",
                    handler = handler.name(),
                    error = %err,
                    "handler_fault"
                ),
                HandlerError::Validation { .. } => tracing::info!(
                    target: "microtrace.request",
                    handler = handler.name(),
                    error = %err,
                    "request_rejected"
                ),
                _ => {}
            }
            if let Some(kind) = err.kind() {
                ctx.set(ERROR_KIND_KEY, kind);
            }
            err.into_response()
        }
        Err(panic) => {
            tracing::error!(
                target: "microtrace.request",
                handler = handler.name(),
                panic = %panic_message(panic.as_ref()),
                "handler_panicked"
            );
            ctx.set(ERROR_KIND_KEY, "panic");
            Response::internal_error()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MiddlewareChain {
    fn clone(&self) -> Self {
        Self {
            middlewares: self.middlewares.clone(),
        }
    }
}
