//! Request handlers and routing.
//!
//! A [`Handler`] produces the response for one route. Handlers never see
//! the pipeline: the chain resolves correlation, tracing and timing before
//! dispatch and turns a [`HandlerError`] or a panic into a response after.

mod analyze;
mod system;
mod worker;

pub use analyze::{AnalyzeHandler, AnalyzeRequest, AnalyzeResponse};
pub use system::{HealthHandler, MetricsHandler};
pub use worker::{AnalysisResult, WorkerService};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, StatusCode};

use crate::core::{Context, Request, Response};
use crate::observability::UNMATCHED_ROUTE;

/// Endpoint logic for one route.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    async fn handle(&self, req: Request, ctx: &Context) -> Result<Response, HandlerError>;
}

/// Failure of a handler.
#[derive(Debug)]
pub enum HandlerError {
    /// The request was rejected: 400 for an unreadable body, 422 for a
    /// well-formed body with missing or mistyped fields.
    Validation { status: StatusCode, detail: String },
    NotFound,
    MethodNotAllowed,
    /// Unexpected failure. The message is logged, never sent to the client.
    Fault(String),
}

impl HandlerError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        HandlerError::Validation {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub fn unprocessable(detail: impl Into<String>) -> Self {
        HandlerError::Validation {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: detail.into(),
        }
    }

    pub fn payload_too_large() -> Self {
        HandlerError::Validation {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            detail: "request body too large".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::Validation { status, .. } => *status,
            HandlerError::NotFound => StatusCode::NOT_FOUND,
            HandlerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            HandlerError::Fault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label for `microtrace_errors_total`. Routing misses are not counted.
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            HandlerError::Validation { .. } => Some("validation"),
            HandlerError::Fault(_) => Some("fault"),
            HandlerError::NotFound | HandlerError::MethodNotAllowed => None,
        }
    }

    pub fn into_response(self) -> Response {
        match self {
            HandlerError::Validation { status, detail } => Response::detail(status, &detail),
            HandlerError::NotFound => Response::not_found(),
            HandlerError::MethodNotAllowed => Response::method_not_allowed(),
            HandlerError::Fault(_) => Response::internal_error(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Validation { status, detail } => {
                write!(f, "validation failed ({}): {}", status.as_u16(), detail)
            }
            HandlerError::NotFound => write!(f, "not found"),
            HandlerError::MethodNotAllowed => write!(f, "method not allowed"),
            HandlerError::Fault(msg) => write!(f, "handler fault: {}", msg),
        }
    }
}

impl std::error::Error for HandlerError {}

/// Answers every request with a routing error.
struct RoutingMiss {
    method_not_allowed: bool,
}

#[async_trait]
impl Handler for RoutingMiss {
    fn name(&self) -> &'static str {
        "routing"
    }

    async fn handle(&self, _req: Request, _ctx: &Context) -> Result<Response, HandlerError> {
        if self.method_not_allowed {
            Err(HandlerError::MethodNotAllowed)
        } else {
            Err(HandlerError::NotFound)
        }
    }
}

/// Stands in for the route handler when the request body exceeded the
/// server's limit, so the rejection still passes through the chain.
pub struct BodyTooLarge;

#[async_trait]
impl Handler for BodyTooLarge {
    fn name(&self) -> &'static str {
        "body_limit"
    }

    async fn handle(&self, _req: Request, _ctx: &Context) -> Result<Response, HandlerError> {
        Err(HandlerError::payload_too_large())
    }
}

/// A resolved route: the metrics label and the handler to run.
pub struct Route<'a> {
    pub template: String,
    pub handler: &'a dyn Handler,
}

/// Exact-match router over `(method, path)`.
pub struct Router {
    routes: Vec<(Method, &'static str, Arc<dyn Handler>)>,
    not_found: RoutingMiss,
    method_not_allowed: RoutingMiss,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            not_found: RoutingMiss {
                method_not_allowed: false,
            },
            method_not_allowed: RoutingMiss {
                method_not_allowed: true,
            },
        }
    }

    pub fn route<H: Handler + 'static>(self, method: Method, path: &'static str, handler: H) -> Self {
        self.route_arc(method, path, Arc::new(handler))
    }

    pub fn route_arc(mut self, method: Method, path: &'static str, handler: Arc<dyn Handler>) -> Self {
        self.routes.push((method, path, handler));
        self
    }

    /// Find the handler for a request.
    ///
    /// A known path with another method resolves to a 405 handler under the
    /// path's template; an unknown path resolves to a 404 handler under the
    /// fixed [`UNMATCHED_ROUTE`] label.
    pub fn resolve(&self, method: &Method, path: &str) -> Route<'_> {
        let mut path_known = false;
        for (m, template, handler) in &self.routes {
            if *template != path {
                continue;
            }
            if m == method {
                return Route {
                    template: template.to_string(),
                    handler: handler.as_ref(),
                };
            }
            path_known = true;
        }

        if path_known {
            Route {
                template: path.to_string(),
                handler: &self.method_not_allowed,
            }
        } else {
            Route {
                template: UNMATCHED_ROUTE.to_string(),
                handler: &self.not_found,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
