//! Connection handling: hyper plumbing between a socket and the pipeline.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming as IncomingBody;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpStream;
use tracing::debug;

use crate::core::Request;
use crate::pipeline::Pipeline;

/// Check if an error is a common connection reset or timeout.
#[inline]
fn is_connection_error(err_str: &str) -> bool {
    err_str.contains("connection reset")
        || err_str.contains("broken pipe")
        || err_str.contains("Connection reset")
        || err_str.contains("os error 104")
        || err_str.contains("os error 32")
        || err_str.contains("timed out")
}

/// State shared by all connections of one listener.
pub struct ConnectionContext {
    pub pipeline: Arc<Pipeline>,
    pub active_connections: Arc<AtomicUsize>,
    pub max_body_bytes: usize,
}

impl ConnectionContext {
    pub fn new(
        pipeline: Arc<Pipeline>,
        active_connections: Arc<AtomicUsize>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            pipeline,
            active_connections,
            max_body_bytes,
        }
    }

    /// Build the future serving one TCP connection (HTTP/1.1 or HTTP/2)
    /// until it closes.
    ///
    /// The connection is registered with `graceful` before this returns, so
    /// a shutdown signalled afterwards lets its in-flight requests finish and
    /// then closes it (HTTP/1 keep-alive ends, HTTP/2 sends GOAWAY).
    pub fn serve_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
        graceful: &GracefulShutdown,
    ) -> impl Future<Output = ()> + Send + 'static {
        self.active_connections.fetch_add(1, Ordering::Relaxed);

        let ctx = Arc::clone(self);
        let service = service_fn(move |req| {
            let ctx = Arc::clone(&ctx);
            async move { ctx.handle_request(req, remote_addr).await }
        });

        let conn = auto::Builder::new(TokioExecutor::new())
            .serve_connection(TokioIo::new(stream), service)
            .into_owned();
        let conn = graceful.watch(conn);

        let active = Arc::clone(&self.active_connections);
        async move {
            tokio::pin!(conn);
            let result = conn.as_mut().await;
            // Still registered with the drain until `conn` drops at the end
            // of this block, so the count reaches zero before it completes.
            active.fetch_sub(1, Ordering::Relaxed);

            if let Err(err) = result {
                let err_str = format!("{:?}", err);
                if !is_connection_error(&err_str) {
                    debug!(target: "microtrace.server", error = %err_str, "connection error");
                }
            }
        }
    }

    async fn handle_request(
        &self,
        req: hyper::Request<IncomingBody>,
        remote_addr: SocketAddr,
    ) -> Result<http::Response<Full<Bytes>>, Infallible> {
        let (parts, body) = req.into_parts();
        let body = match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                debug!(
                    target: "microtrace.server",
                    limit = self.max_body_bytes,
                    "request body over limit"
                );
                let req = Request::from(http::Request::from_parts(parts, Bytes::new()));
                let res = self.pipeline.reject_oversized(req, remote_addr.ip()).await;
                return Ok(res.into_http());
            }
            Err(e) => {
                // The handler sees an empty body and rejects it
                debug!(target: "microtrace.server", error = %e, "failed to read request body");
                Bytes::new()
            }
        };

        let req = Request::from(http::Request::from_parts(parts, body));
        let res = self.pipeline.handle(req, remote_addr.ip()).await;
        Ok(res.into_http())
    }
}
