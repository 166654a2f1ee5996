//! Simulated downstream worker.

use std::time::Duration;

use serde::Serialize;

use crate::observability::{SpanGuard, Tracer};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub sum: f64,
    pub difference: f64,
}

/// Stand-in for work done in another service. Each call opens a child span
/// of the request and sleeps for `work_delay` so timings are observable.
#[derive(Debug, Clone)]
pub struct WorkerService {
    tracer: Tracer,
    work_delay: Duration,
}

impl WorkerService {
    pub fn new(tracer: Tracer, work_delay: Duration) -> Self {
        Self { tracer, work_delay }
    }

    pub async fn analyze(&self, a: f64, b: f64, parent: Option<&SpanGuard>) -> AnalysisResult {
        let mut span = self.tracer.start_span("WorkerService.analyze", parent);
        span.set_attribute("worker.input_a", a);
        span.set_attribute("worker.input_b", b);

        if !self.work_delay.is_zero() {
            tokio::time::sleep(self.work_delay).await;
        }

        let result = AnalysisResult {
            sum: a + b,
            difference: a - b,
        };
        span.set_attribute("worker.sum", result.sum);
        span.set_attribute("worker.difference", result.difference);

        tracing::debug!(
            target: "microtrace.worker",
            input_a = a,
            input_b = b,
            sum = result.sum,
            "analysis_completed"
        );

        result
    }
}
