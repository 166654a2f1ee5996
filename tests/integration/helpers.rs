//! Test helpers and utilities

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use microtrace::config::{ChaosConfig, Config};
use microtrace::core::{Request, Response};
use microtrace::logging;
use microtrace::middleware::ChaosInjector;
use microtrace::observability::{Metrics, Tracer};
use microtrace::{Pipeline, Server};
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

// =============================================================================
// Log capture
// =============================================================================

/// In-memory log sink; each write is one JSON line.
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl LogCapture {
    /// Install the crate's subscriber on this thread, writing here.
    pub fn install(filter: &str) -> (Self, DefaultGuard) {
        let capture = Self::default();
        let guard =
            tracing::subscriber::set_default(logging::subscriber(filter, "microtrace", capture.clone()));
        (capture, guard)
    }

    /// All records written so far.
    pub fn records(&self) -> Vec<Value> {
        let buf = self.buf.lock().unwrap();
        String::from_utf8_lossy(&buf)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).expect("log line is not JSON"))
            .collect()
    }

    /// Records with the given `msg`.
    pub fn with_msg(&self, msg: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| r["msg"] == msg)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// =============================================================================
// Span capture
// =============================================================================

/// Ended spans, collected in end order.
#[derive(Clone, Default)]
pub struct SpanCapture {
    exporter: InMemorySpanExporter,
}

#[allow(dead_code)]
impl SpanCapture {
    pub fn tracer(&self) -> Tracer {
        Tracer::with_exporter(self.exporter.clone())
    }

    pub fn spans(&self) -> Vec<SpanData> {
        self.exporter.get_finished_spans().unwrap()
    }

    pub fn named(&self, name: &str) -> Vec<SpanData> {
        self.spans().into_iter().filter(|s| s.name == name).collect()
    }
}

/// Attribute value of a span, rendered as a string.
#[allow(dead_code)]
pub fn span_attr(span: &SpanData, key: &str) -> Option<String> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.as_str().into_owned())
}

#[allow(dead_code)]
pub fn trace_id(span: &SpanData) -> String {
    span.span_context.trace_id().to_string()
}

#[allow(dead_code)]
pub fn span_id(span: &SpanData) -> String {
    span.span_context.span_id().to_string()
}

// =============================================================================
// In-process pipeline
// =============================================================================

/// Standard pipeline wired to in-memory telemetry sinks.
pub struct TestPipeline {
    pub pipeline: Pipeline,
    pub metrics: Arc<Metrics>,
    pub spans: SpanCapture,
}

#[allow(dead_code)]
impl TestPipeline {
    pub fn new() -> Self {
        Self::with_chaos(ChaosConfig::default())
    }

    pub fn with_chaos(chaos: ChaosConfig) -> Self {
        let mut config = Config::default();
        config.server.worker_delay = Duration::from_millis(10);
        config.chaos = chaos;

        let metrics = Arc::new(Metrics::new().unwrap());
        let spans = SpanCapture::default();
        let pipeline = Pipeline::new(
            &config,
            Arc::clone(&metrics),
            spans.tracer(),
            Arc::new(ChaosInjector::new(config.chaos.clone()).unwrap()),
        );

        Self {
            pipeline,
            metrics,
            spans,
        }
    }

    pub async fn send(&self, req: Request) -> Response {
        self.pipeline
            .handle(req, IpAddr::V4(Ipv4Addr::LOCALHOST))
            .await
    }
}

/// Build a pipeline request.
#[allow(dead_code)]
pub fn request(method: &str, path: &str, headers: &[(&str, &str)], body: &str) -> Request {
    let mut builder = http::Request::builder().method(method).uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder
        .body(Bytes::from(body.to_string()))
        .unwrap()
        .into()
}

/// `POST /analyze` with a JSON body.
#[allow(dead_code)]
pub fn analyze(body: &str, headers: &[(&str, &str)]) -> Request {
    let mut all = vec![("content-type", "application/json")];
    all.extend_from_slice(headers);
    request("POST", "/analyze", &all, body)
}

// =============================================================================
// Real server
// =============================================================================

/// Request body limit of [`TestServer`].
#[allow(dead_code)]
pub const TEST_MAX_BODY_BYTES: usize = 1024;

/// Server bound to ephemeral ports on localhost.
pub struct TestServer {
    pub base_url: String,
    pub internal_url: String,
    pub client: Client,
    pub server: Arc<Server>,
    pub metrics: Arc<Metrics>,
    handle: JoinHandle<()>,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let internal = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let internal_addr: SocketAddr = internal.local_addr().unwrap();

        let mut config = Config::default();
        config.server.listen_addr = addr;
        config.server.internal_addr = Some(internal_addr);
        config.server.worker_delay = Duration::from_millis(1);
        config.server.max_body_bytes = TEST_MAX_BODY_BYTES;

        let metrics = Arc::new(Metrics::new().unwrap());
        let pipeline = Arc::new(Pipeline::new(
            &config,
            Arc::clone(&metrics),
            Tracer::noop(),
            Arc::new(ChaosInjector::disabled()),
        ));
        let server = Arc::new(Server::new(
            config.server.clone(),
            pipeline,
            Arc::clone(&metrics),
        ));

        let running = Arc::clone(&server);
        let handle = tokio::spawn(async move {
            running.serve(listener, Some(internal)).await.unwrap();
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: format!("http://{}", addr),
            internal_url: format!("http://{}", internal_addr),
            client,
            server,
            metrics,
            handle,
        }
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("GET request failed")
    }

    pub async fn post_json(&self, path: &str, body: &Value, headers: &[(&str, &str)]) -> reqwest::Response {
        let mut req = self.client.post(format!("{}{}", self.base_url, path)).json(body);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        req.send().await.expect("POST request failed")
    }

    pub async fn post_raw(&self, path: &str, body: &'static str) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("POST request failed")
    }

    pub async fn post_bytes(&self, path: &str, body: Vec<u8>, headers: &[(&str, &str)]) -> reqwest::Response {
        let mut req = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("content-type", "application/json")
            .body(body);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        req.send().await.expect("POST request failed")
    }

    pub async fn internal_get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.internal_url, path))
            .send()
            .await
            .expect("Internal GET request failed")
    }

    /// Stop accepting, drain and wait for `serve` to return.
    pub async fn shutdown(self) {
        self.server.trigger_shutdown();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked");
    }
}

/// Assert that response has expected status
pub fn assert_status(response: &reqwest::Response, expected: StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "Expected status {}, got {}",
        expected,
        response.status()
    );
}

/// Assert that response contains header
#[allow(dead_code)]
pub fn assert_header(response: &reqwest::Response, name: &str, expected: &str) {
    let value = response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("Header '{}' not found", name))
        .to_str()
        .unwrap();
    assert_eq!(value, expected, "Header '{}' mismatch", name);
}

/// Assert that response contains header with prefix
#[allow(dead_code)]
pub fn assert_header_starts_with(response: &reqwest::Response, name: &str, prefix: &str) {
    let value = response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("Header '{}' not found", name))
        .to_str()
        .unwrap();
    assert!(
        value.starts_with(prefix),
        "Header '{}' expected to start with '{}', got '{}'",
        name,
        prefix,
        value
    );
}

/// Assert that response body contains substring
#[allow(dead_code)]
pub async fn assert_body_contains(response: reqwest::Response, substring: &str) {
    let body = response.text().await.expect("Failed to read body");
    assert!(
        body.contains(substring),
        "Body does not contain '{}'. Body: {}",
        substring,
        &body[..body.len().min(500)]
    );
}
