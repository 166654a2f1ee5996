//! Internal HTTP server for health and metrics endpoints.
//!
//! Runs on its own listener (`INTERNAL_ADDR`) so scrapers and probes do not
//! go through the public pipeline and do not show up in request metrics.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming as IncomingBody;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::debug;

use crate::core::Response;
use crate::handler::{HealthHandler, MetricsHandler};
use crate::observability::Metrics;

/// Accept internal connections until shutdown is signalled.
pub async fn run_internal_server(
    listener: TcpListener,
    metrics: Arc<Metrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let metrics_handler = Arc::new(MetricsHandler::new(metrics));

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, _) = result?;
                let _ = stream.set_nodelay(true);
                let metrics_handler = Arc::clone(&metrics_handler);

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let m = Arc::clone(&metrics_handler);
                        async move { handle_internal_request(req, &m) }
                    });

                    let io = TokioIo::new(stream);
                    let _ = http1::Builder::new().serve_connection(io, service).await;
                });
            }
            _ = shutdown_rx.changed() => {
                debug!(target: "microtrace.server", "Internal server received shutdown signal");
                return Ok(());
            }
        }
    }
}

/// Handle internal server requests (/health, /metrics).
fn handle_internal_request(
    req: hyper::Request<IncomingBody>,
    metrics: &MetricsHandler,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&http::Method::GET, "/health") => HealthHandler.render(),
        (&http::Method::GET, "/metrics") => metrics.render(),
        (_, "/health") | (_, "/metrics") => Response::method_not_allowed(),
        _ => Response::not_found(),
    };
    Ok(response.into_http())
}
