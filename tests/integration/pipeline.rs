//! Pipeline behaviour without a network: correlation, metrics, logs,
//! spans, error mapping and chaos timing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::{Method, StatusCode};
use microtrace::config::ChaosConfig;
use microtrace::core::{Context, Request, Response};
use microtrace::handler::{Handler, HandlerError, Router};
use microtrace::middleware::{
    AccessLogMiddleware, Middleware, MiddlewareChain, RequestIdMiddleware, TracingMiddleware,
};
use microtrace::observability::{Metrics, UNMATCHED_ROUTE};
use microtrace::Pipeline;
use opentelemetry::trace::Status;
use serde_json::json;

use crate::helpers::*;

#[tokio::test]
async fn test_request_id_echoed() {
    let t = TestPipeline::new();
    let res = t
        .send(analyze(r#"{"a": 5, "b": 3}"#, &[("X-Request-ID", "demo-123")]))
        .await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.header("x-request-id"), Some("demo-123"));
    assert_eq!(
        res.json_body().unwrap(),
        json!({"sum": 8.0, "difference": 2.0})
    );
}

#[tokio::test]
async fn test_generated_ids_are_unique_uuids() {
    let t = TestPipeline::new();
    let a = t.send(request("GET", "/health", &[], "")).await;
    let b = t.send(request("GET", "/health", &[], "")).await;

    let a = a.header("x-request-id").unwrap().to_string();
    let b = b.header("x-request-id").unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&a).is_ok(), "not a UUID: {}", a);
    assert!(uuid::Uuid::parse_str(&b).is_ok(), "not a UUID: {}", b);
    assert_ne!(a, b);
}

#[tokio::test]
async fn test_logs_carry_request_id() {
    let (logs, _guard) = LogCapture::install("microtrace=debug");
    let t = TestPipeline::new();

    t.send(analyze(r#"{"a": 1, "b": 2}"#, &[("X-Request-ID", "demo-123")]))
        .await;

    let records = logs.records();
    for msg in ["analyze_request", "analysis_completed", "analyze_response", "request_completed"] {
        let found: Vec<_> = records.iter().filter(|r| r["msg"] == msg).collect();
        assert_eq!(found.len(), 1, "expected one {} record", msg);
        assert_eq!(found[0]["ctx"]["request_id"], "demo-123", "{} lacks request_id", msg);
    }

    let request = &logs.with_msg("analyze_request")[0];
    assert_eq!(request["logger"], "microtrace.api");
    assert_eq!(request["data"]["input_a"], 1.0);
    assert_eq!(request["data"]["input_b"], 2.0);

    let completed = &logs.with_msg("request_completed")[0];
    assert_eq!(completed["logger"], "microtrace.request");
    assert_eq!(completed["data"]["method"], "POST");
    assert_eq!(completed["data"]["route"], "/analyze");
    assert_eq!(completed["data"]["status_code"], 200);
    assert!(completed["data"]["elapsed_ms"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn test_non_ascii_request_id_echoed_verbatim() {
    let (logs, _guard) = LogCapture::install("microtrace=info");
    let t = TestPipeline::new();

    let mut req = analyze(r#"{"a": 1, "b": 2}"#, &[]);
    req.headers_mut().insert(
        "x-request-id",
        http::HeaderValue::from_bytes(b"caf\xc3\xa9-1").unwrap(),
    );
    let res = t.send(req).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("x-request-id").unwrap().as_bytes(),
        b"caf\xc3\xa9-1"
    );
    let completed = &logs.with_msg("request_completed")[0];
    assert_eq!(completed["ctx"]["request_id"], "café-1");
}

#[tokio::test]
async fn test_generated_id_matches_logs_and_header() {
    let (logs, _guard) = LogCapture::install("microtrace=info");
    let t = TestPipeline::new();

    let res = t.send(analyze(r#"{"a": 1, "b": 2}"#, &[])).await;
    let echoed = res.header("x-request-id").unwrap().to_string();

    let completed = &logs.with_msg("request_completed")[0];
    assert_eq!(completed["ctx"]["request_id"], echoed.as_str());
    let root = &t.spans.named("POST /analyze")[0];
    assert_eq!(span_attr(root, "request_id").as_deref(), Some(echoed.as_str()));
}

#[tokio::test]
async fn test_validation_failure_logged_with_status() {
    let (logs, _guard) = LogCapture::install("microtrace=info");
    let t = TestPipeline::new();

    t.send(analyze(r#"{"a": "x", "b": 3}"#, &[("X-Request-ID", "bad-1")]))
        .await;

    let completed = &logs.with_msg("request_completed")[0];
    assert_eq!(completed["ctx"]["request_id"], "bad-1");
    assert_eq!(completed["data"]["status_code"], 422);
    assert_eq!(completed["data"]["route"], "/analyze");
    // Client errors do not fail the span
    let root = &t.spans.named("POST /analyze")[0];
    assert_eq!(root.status, Status::Ok);
}

#[tokio::test]
async fn test_logs_outside_request_have_no_request_id() {
    let (logs, _guard) = LogCapture::install("microtrace=info");
    tracing::info!(target: "microtrace.server", "startup");

    let record = &logs.with_msg("startup")[0];
    assert_eq!(record["ctx"]["service"], "microtrace");
    assert!(record["ctx"].get("request_id").is_none());
}

#[tokio::test]
async fn test_metrics_count_each_request() {
    let t = TestPipeline::new();

    t.send(analyze(r#"{"a": 5, "b": 3}"#, &[("X-Request-ID", "demo-123")]))
        .await;
    assert_eq!(t.metrics.request_count("POST", "/analyze", 200), 1);
    assert_eq!(t.metrics.latency_count("POST", "/analyze"), 1);

    // Replaying the same id is still a second request
    t.send(analyze(r#"{"a": 5, "b": 3}"#, &[("X-Request-ID", "demo-123")]))
        .await;
    assert_eq!(t.metrics.request_count("POST", "/analyze", 200), 2);
    assert_eq!(t.metrics.latency_count("POST", "/analyze"), 2);
}

#[tokio::test]
async fn test_validation_errors() {
    let t = TestPipeline::new();

    let res = t.send(analyze(r#"{"a": 5}"#, &[])).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.header("x-request-id").is_some());
    assert!(res.json_body().unwrap()["detail"].is_string());

    let res = t.send(analyze("{not json", &[])).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    assert_eq!(t.metrics.request_count("POST", "/analyze", 422), 1);
    assert_eq!(t.metrics.request_count("POST", "/analyze", 400), 1);
    assert_eq!(t.metrics.error_count("POST", "/analyze", "validation"), 2);
}

#[tokio::test]
async fn test_routing_misses() {
    let t = TestPipeline::new();

    let res = t.send(request("GET", "/items/42", &[], "")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.header("x-request-id").is_some());
    assert_eq!(t.metrics.request_count("GET", UNMATCHED_ROUTE, 404), 1);

    let res = t.send(request("GET", "/analyze", &[], "")).await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(t.metrics.request_count("GET", "/analyze", 405), 1);
}

#[tokio::test]
async fn test_unknown_paths_share_one_metric_series() {
    let t = TestPipeline::new();

    for i in 0..200 {
        let path = format!("/scan-{}/{:x}", i, i * 7919);
        let res = t.send(request("GET", &path, &[], "")).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    assert_eq!(t.metrics.request_count("GET", UNMATCHED_ROUTE, 404), 200);
    let families = t.metrics.registry().gather();
    let requests = families
        .iter()
        .find(|f| f.get_name() == "microtrace_requests_total")
        .unwrap();
    assert_eq!(requests.get_metric().len(), 1);
    assert!(!t.metrics.render().contains("/scan-"));
}

#[tokio::test]
async fn test_spans_carry_request_id() {
    let t = TestPipeline::new();
    t.send(analyze(r#"{"a": 5, "b": 3}"#, &[("X-Request-ID", "demo-123")]))
        .await;

    let spans = t.spans.spans();
    assert_eq!(spans.len(), 2);
    // Child closes before the root
    assert_eq!(spans[0].name, "WorkerService.analyze");
    assert_eq!(spans[1].name, "POST /analyze");
    assert!(spans
        .iter()
        .all(|s| span_attr(s, "request_id").as_deref() == Some("demo-123")));
    assert_eq!(trace_id(&spans[0]), trace_id(&spans[1]));
    assert_eq!(spans[0].parent_span_id, spans[1].span_context.span_id());
}

#[tokio::test]
async fn test_traceparent_joined_and_echoed() {
    let t = TestPipeline::new();
    let res = t
        .send(analyze(
            r#"{"a": 5, "b": 3}"#,
            &[("traceparent", "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01")],
        ))
        .await;

    let root = &t.spans.named("POST /analyze")[0];
    assert_eq!(trace_id(root), "0af7651916cd43dd8448eb211c80319c");
    assert_eq!(root.parent_span_id.to_string(), "b7ad6b7169203331");
    assert_eq!(
        res.header("traceparent"),
        Some(format!("00-0af7651916cd43dd8448eb211c80319c-{}-01", span_id(root)).as_str())
    );
}

#[tokio::test]
async fn test_metrics_endpoint_not_traced() {
    let t = TestPipeline::new();
    let res = t.send(request("GET", "/metrics", &[], "")).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert!(t.spans.spans().is_empty());
    // Still counted
    assert_eq!(t.metrics.request_count("GET", "/metrics", 200), 1);
}

#[tokio::test(start_paused = true)]
async fn test_chaos_delay_shows_in_latency() {
    let t = TestPipeline::with_chaos(ChaosConfig {
        enabled: true,
        probability: 1.0,
        min_delay_ms: 150,
        max_delay_ms: 150,
        seed: Some(1),
    });

    let res = t.send(analyze(r#"{"a": 5, "b": 3}"#, &[])).await;
    assert_eq!(res.status(), StatusCode::OK);

    let families = t.metrics.registry().gather();
    let latency = families
        .iter()
        .find(|f| f.get_name() == "microtrace_request_latency_seconds")
        .unwrap();
    let sum = latency.get_metric()[0].get_histogram().get_sample_sum();
    // 150ms chaos plus 10ms simulated work
    assert!(sum >= 0.159, "latency {} should include the injected delay", sum);

    let root = &t.spans.named("POST /analyze")[0];
    assert_eq!(span_attr(root, "chaos.delay_ms").as_deref(), Some("150"));
}

#[tokio::test(start_paused = true)]
async fn test_chaos_disabled_adds_nothing() {
    let t = TestPipeline::new();
    let start = tokio::time::Instant::now();

    for _ in 0..20 {
        t.send(analyze(r#"{"a": 1, "b": 1}"#, &[])).await;
    }

    // Only the simulated work: 20 x 10ms
    assert!(start.elapsed() < Duration::from_millis(100 + 200));
    assert!(t
        .spans
        .named("POST /analyze")
        .iter()
        .all(|s| span_attr(s, "chaos.delay_ms").is_none()));
}

// =============================================================================
// Failure paths with custom handlers
// =============================================================================

struct Panicking;

#[async_trait]
impl Handler for Panicking {
    fn name(&self) -> &'static str {
        "panicking"
    }

    async fn handle(&self, _req: Request, _ctx: &Context) -> Result<Response, HandlerError> {
        panic!("handler exploded");
    }
}

struct Faulty;

#[async_trait]
impl Handler for Faulty {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn handle(&self, _req: Request, _ctx: &Context) -> Result<Response, HandlerError> {
        Err(HandlerError::Fault("upstream unavailable".into()))
    }
}

/// Counts entries and exits.
struct Counting {
    entered: Arc<AtomicU32>,
    exited: Arc<AtomicU32>,
}

#[async_trait]
impl Middleware for Counting {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn priority(&self) -> i32 {
        -50
    }

    async fn on_request(
        &self,
        req: Request,
        _ctx: &mut Context,
    ) -> microtrace::middleware::MiddlewareResult {
        self.entered.fetch_add(1, Ordering::SeqCst);
        microtrace::middleware::MiddlewareResult::Next(req)
    }

    fn on_response(&self, res: Response, _ctx: &mut Context) -> Response {
        self.exited.fetch_add(1, Ordering::SeqCst);
        res
    }
}

fn failing_pipeline(metrics: &Arc<Metrics>, entered: &Arc<AtomicU32>, exited: &Arc<AtomicU32>) -> Pipeline {
    failing_pipeline_traced(metrics, entered, exited, &SpanCapture::default())
}

fn failing_pipeline_traced(
    metrics: &Arc<Metrics>,
    entered: &Arc<AtomicU32>,
    exited: &Arc<AtomicU32>,
    spans: &SpanCapture,
) -> Pipeline {
    let chain = MiddlewareChain::new()
        .add(RequestIdMiddleware::default())
        .add(TracingMiddleware::new(spans.tracer(), Default::default()))
        .add(AccessLogMiddleware::new(Arc::clone(metrics)))
        .add(Counting {
            entered: Arc::clone(entered),
            exited: Arc::clone(exited),
        });
    let router = Router::new()
        .route(Method::GET, "/panic", Panicking)
        .route(Method::GET, "/fault", Faulty);
    Pipeline::from_parts(chain, router)
}

#[tokio::test]
async fn test_panic_becomes_500_and_exits_once() {
    let (logs, _guard) = LogCapture::install("microtrace=info");
    let metrics = Arc::new(Metrics::new().unwrap());
    let entered = Arc::new(AtomicU32::new(0));
    let exited = Arc::new(AtomicU32::new(0));
    let pipeline = failing_pipeline(&metrics, &entered, &exited);

    let res = pipeline
        .handle(
            request("GET", "/panic", &[("X-Request-ID", "boom-1")], ""),
            "127.0.0.1".parse().unwrap(),
        )
        .await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.header("x-request-id"), Some("boom-1"));
    assert_eq!(entered.load(Ordering::SeqCst), 1);
    assert_eq!(exited.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.request_count("GET", "/panic", 500), 1);
    assert_eq!(metrics.error_count("GET", "/panic", "panic"), 1);

    let panicked = &logs.with_msg("handler_panicked")[0];
    assert_eq!(panicked["level"], "error");
    assert_eq!(panicked["ctx"]["request_id"], "boom-1");
    assert_eq!(panicked["data"]["panic"], "handler exploded");
}

#[tokio::test]
async fn test_fault_becomes_500_without_details() {
    let metrics = Arc::new(Metrics::new().unwrap());
    let entered = Arc::new(AtomicU32::new(0));
    let exited = Arc::new(AtomicU32::new(0));
    let pipeline = failing_pipeline(&metrics, &entered, &exited);

    let res = pipeline
        .handle(request("GET", "/fault", &[], ""), "127.0.0.1".parse().unwrap())
        .await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!String::from_utf8_lossy(res.body()).contains("upstream"));
    assert_eq!(exited.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.error_count("GET", "/fault", "fault"), 1);
}

#[tokio::test]
async fn test_failures_close_root_span_once_as_error() {
    let metrics = Arc::new(Metrics::new().unwrap());
    let entered = Arc::new(AtomicU32::new(0));
    let exited = Arc::new(AtomicU32::new(0));
    let spans = SpanCapture::default();
    let pipeline = failing_pipeline_traced(&metrics, &entered, &exited, &spans);

    for path in ["/panic", "/fault"] {
        let res = pipeline
            .handle(
                request("GET", path, &[("X-Request-ID", "fail-1")], ""),
                "127.0.0.1".parse().unwrap(),
            )
            .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.header("traceparent").is_some());

        let name = format!("GET {}", path);
        let roots = spans.named(&name);
        assert_eq!(roots.len(), 1, "{} closed {} times", name, roots.len());
        assert!(matches!(roots[0].status, Status::Error { .. }), "{}", name);
        assert_eq!(span_attr(&roots[0], "request_id").as_deref(), Some("fail-1"));
        assert_eq!(
            span_attr(&roots[0], "http.response.status_code").as_deref(),
            Some("500")
        );
    }
    assert_eq!(spans.spans().len(), 2);
}

#[tokio::test]
async fn test_concurrent_requests_are_all_counted() {
    let t = Arc::new(TestPipeline::new());

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let t = Arc::clone(&t);
            tokio::spawn(async move {
                let id = format!("req-{}", i);
                let res = t
                    .send(analyze(r#"{"a": 1, "b": 1}"#, &[("X-Request-ID", id.as_str())]))
                    .await;
                assert_eq!(res.header("x-request-id"), Some(id.as_str()));
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(t.metrics.request_count("POST", "/analyze", 200), 50);
    assert_eq!(t.spans.named("POST /analyze").len(), 50);
}
