//! Operational endpoints: `/metrics` and `/health`.

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use serde_json::json;

use super::{Handler, HandlerError};
use crate::core::{Context, Request, Response};
use crate::logging;
use crate::observability::metrics::CONTENT_TYPE;
use crate::observability::Metrics;

/// Prometheus text exposition of the process metrics.
pub struct MetricsHandler {
    metrics: Arc<Metrics>,
}

impl MetricsHandler {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    /// Render the exposition as a response, outside of any pipeline.
    pub fn render(&self) -> Response {
        Response::builder()
            .status(StatusCode::OK)
            .content_type(CONTENT_TYPE)
            .body(self.metrics.render())
            .build()
    }
}

#[async_trait]
impl Handler for MetricsHandler {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn handle(&self, _req: Request, _ctx: &Context) -> Result<Response, HandlerError> {
        Ok(self.render())
    }
}

/// Liveness probe.
#[derive(Debug, Default, Clone, Copy)]
pub struct HealthHandler;

impl HealthHandler {
    pub fn render(&self) -> Response {
        Response::json(
            StatusCode::OK,
            &json!({ "status": "ok", "timestamp": logging::timestamp() }),
        )
    }
}

#[async_trait]
impl Handler for HealthHandler {
    fn name(&self) -> &'static str {
        "health"
    }

    async fn handle(&self, _req: Request, _ctx: &Context) -> Result<Response, HandlerError> {
        Ok(self.render())
    }
}
