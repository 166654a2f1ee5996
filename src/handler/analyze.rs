//! `POST /analyze`: sum and difference of two numbers.

use async_trait::async_trait;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::Level;

use super::{Handler, HandlerError, WorkerService};
use crate::core::{Context, Request, Response};
use crate::logging;

const LOGGER: &str = "microtrace.api";

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AnalyzeRequest {
    pub a: f64,
    pub b: f64,
}

impl AnalyzeRequest {
    /// Parse a request body. Unreadable JSON is a 400; valid JSON with a
    /// missing or mistyped field is a 422.
    pub fn parse(body: &[u8]) -> Result<Self, HandlerError> {
        serde_json::from_slice(body).map_err(|e| match e.classify() {
            serde_json::error::Category::Data => HandlerError::unprocessable(e.to_string()),
            _ => HandlerError::bad_request(format!("malformed JSON body: {}", e)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub sum: f64,
    pub difference: f64,
}

pub struct AnalyzeHandler {
    worker: WorkerService,
}

impl AnalyzeHandler {
    pub fn new(worker: WorkerService) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl Handler for AnalyzeHandler {
    fn name(&self) -> &'static str {
        "analyze"
    }

    async fn handle(&self, req: Request, ctx: &Context) -> Result<Response, HandlerError> {
        let payload = AnalyzeRequest::parse(req.body())?;
        logging::emit(
            Level::INFO,
            LOGGER,
            "analyze_request",
            json!({ "input_a": payload.a, "input_b": payload.b }),
        );

        let result = self.worker.analyze(payload.a, payload.b, ctx.span()).await;
        let body = AnalyzeResponse {
            sum: result.sum,
            difference: result.difference,
        };
        logging::emit(
            Level::INFO,
            LOGGER,
            "analyze_response",
            json!({ "sum": body.sum, "difference": body.difference }),
        );

        Ok(Response::json(StatusCode::OK, &body))
    }
}
