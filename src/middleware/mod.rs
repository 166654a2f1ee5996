//! Middleware pipeline for request/response processing.
//!
//! Every inbound request passes through an ordered chain of stages before
//! it reaches a [`Handler`](crate::handler::Handler), and back through the
//! same stages in reverse on the way out. Stages can:
//! - Inspect and annotate the request context
//! - Suspend the request (chaos delay)
//! - Short-circuit the pipeline with an early response
//! - Modify the outgoing response
//!
//! # Example
//!
//! ```rust,ignore
//! use microtrace::middleware::{Middleware, MiddlewareResult, MiddlewareChain};
//! use microtrace::core::{Request, Response, Context};
//!
//! struct LoggingMiddleware;
//!
//! #[async_trait]
//! impl Middleware for LoggingMiddleware {
//!     fn name(&self) -> &'static str { "logging" }
//!
//!     async fn on_request(&self, req: Request, ctx: &mut Context) -> MiddlewareResult {
//!         tracing::info!("Request: {} {}", req.method(), req.path());
//!         MiddlewareResult::Next(req)
//!     }
//!
//!     fn on_response(&self, res: Response, ctx: &mut Context) -> Response {
//!         tracing::info!("Response: {}", res.status());
//!         res
//!     }
//! }
//!
//! let chain = MiddlewareChain::new().add(LoggingMiddleware);
//! ```

mod chain;

pub mod access_log;
pub mod chaos;
pub mod request_id;
pub mod telemetry;

pub use access_log::AccessLogMiddleware;
pub use chain::MiddlewareChain;
pub use chaos::{ChaosInjector, ChaosMiddleware};
pub use request_id::{resolve_request_id, RequestId, RequestIdMiddleware};
pub use telemetry::TracingMiddleware;

use async_trait::async_trait;

use crate::core::{Context, Request, Response};

/// Context key under which a failed dispatch records its error kind.
pub const ERROR_KIND_KEY: &str = "error_kind";

/// Result of middleware request processing.
#[derive(Debug)]
pub enum MiddlewareResult {
    /// Continue to the next middleware with the (possibly modified) request.
    Next(Request),
    /// Stop the middleware chain and return this response immediately.
    Stop(Response),
}

impl MiddlewareResult {
    pub fn is_next(&self) -> bool {
        matches!(self, MiddlewareResult::Next(_))
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, MiddlewareResult::Stop(_))
    }

    pub fn into_request(self) -> Option<Request> {
        match self {
            MiddlewareResult::Next(req) => Some(req),
            MiddlewareResult::Stop(_) => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            MiddlewareResult::Next(_) => None,
            MiddlewareResult::Stop(res) => Some(res),
        }
    }
}

/// A pipeline stage.
///
/// The chain executes `on_request` in priority order and `on_response` in
/// reverse order. A stage whose `on_request` ran gets exactly one
/// `on_response` call, whatever the handler did.
///
/// # Lifecycle
///
/// ```text
/// Request → MW1.on_request → MW2.on_request → Handler
///                                                ↓
/// Response ← MW1.on_response ← MW2.on_response ←─┘
/// ```
///
/// - `on_request` may await (e.g. an injected delay) or short-circuit
/// - `on_response` is synchronous and must not fail
/// - Context carries values from one stage to the next
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Unique name for this middleware (used for logging/debugging).
    fn name(&self) -> &'static str;

    /// Lower values execute first for requests, last for responses.
    ///
    /// Ranges in use:
    /// - -100..-50: Correlation, tracing, access log
    /// - 0: Fault injection
    fn priority(&self) -> i32 {
        0
    }

    /// Process an incoming request.
    ///
    /// Return `MiddlewareResult::Next(req)` to continue the chain,
    /// or `MiddlewareResult::Stop(res)` to short-circuit with a response.
    async fn on_request(&self, req: Request, _ctx: &mut Context) -> MiddlewareResult {
        MiddlewareResult::Next(req)
    }

    /// Process an outgoing response.
    fn on_response(&self, res: Response, _ctx: &mut Context) -> Response {
        res
    }
}
