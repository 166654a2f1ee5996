//! HTTP server running the telemetry pipeline.
//!
//! The public listener serves every route through the [`Pipeline`]. An
//! optional internal listener serves `/health` and `/metrics` directly.
//!
//! # Example
//!
//! ```rust,ignore
//! use microtrace::server::Server;
//!
//! let server = Arc::new(Server::new(config.server.clone(), pipeline, metrics));
//! let signal = Arc::clone(&server);
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     signal.trigger_shutdown();
//! });
//! server.run().await?; // returns once drained
//! ```
//!
//! # Graceful Shutdown
//!
//! [`Server::trigger_shutdown`] stops the accept loops and tells every open
//! connection to finish its in-flight requests and close: idle HTTP/1
//! keep-alive connections close at once, HTTP/2 connections get GOAWAY.
//! `serve` returns when all of them are gone or the drain timeout passes.

mod connection;
mod internal;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use connection::ConnectionContext;
use internal::run_internal_server;

use crate::config::ServerConfig;
use crate::core::Result;
use crate::observability::Metrics;
use crate::pipeline::Pipeline;

pub struct Server {
    config: ServerConfig,
    pipeline: Arc<Pipeline>,
    metrics: Arc<Metrics>,
    /// Active connections counter
    active_connections: Arc<AtomicUsize>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl Server {
    pub fn new(config: ServerConfig, pipeline: Arc<Pipeline>, metrics: Arc<Metrics>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            pipeline,
            metrics,
            active_connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
            shutdown_rx,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind the configured addresses and serve until shutdown.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        let internal = match self.config.internal_addr {
            Some(addr) => Some(TcpListener::bind(addr).await?),
            None => None,
        };
        self.serve(listener, internal).await
    }

    /// Serve on already-bound listeners until shutdown, then drain.
    pub async fn serve(&self, listener: TcpListener, internal: Option<TcpListener>) -> Result<()> {
        let mut internal_handle = None;
        if let Some(internal) = internal {
            let addr = internal.local_addr()?;
            let metrics = Arc::clone(&self.metrics);
            let shutdown_rx = self.shutdown_rx.clone();

            internal_handle = Some(tokio::spawn(async move {
                if let Err(e) = run_internal_server(internal, metrics, shutdown_rx).await {
                    error!(target: "microtrace.server", error = %e, "Internal server error");
                }
            }));
            info!(target: "microtrace.server", "Internal server listening on http://{}", addr);
        }

        info!(
            target: "microtrace.server",
            "Server listening on http://{} (stages: {})",
            listener.local_addr()?,
            self.pipeline.chain().names().join(", ")
        );

        let ctx = Arc::new(ConnectionContext::new(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.active_connections),
            self.config.max_body_bytes,
        ));
        let graceful = GracefulShutdown::new();
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, remote_addr) = match result {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!(target: "microtrace.server", error = %e, "Accept error");
                            continue;
                        }
                    };
                    let _ = stream.set_nodelay(true);

                    tokio::spawn(ctx.serve_connection(stream, remote_addr, &graceful));
                }
                _ = shutdown_rx.changed() => {
                    debug!(target: "microtrace.server", "Received shutdown signal, stopping accept loop");
                    break;
                }
            }
        }

        drop(listener);

        let active = self.active_connections();
        if active > 0 {
            info!(target: "microtrace.server", active, "Draining connections");
        }
        if tokio::time::timeout(self.config.drain_timeout, graceful.shutdown())
            .await
            .is_err()
        {
            warn!(
                target: "microtrace.server",
                active = self.active_connections(),
                "Drain timeout reached"
            );
        }

        if let Some(handle) = internal_handle {
            let _ = handle.await;
        }

        Ok(())
    }

    /// Trigger graceful shutdown.
    /// Signals all accept loops to stop accepting new connections.
    pub fn trigger_shutdown(&self) {
        if self.shutdown_initiated.swap(true, Ordering::SeqCst) {
            return; // Already initiated
        }
        let _ = self.shutdown_tx.send(true);
    }

    pub fn drain_timeout(&self) -> Duration {
        self.config.drain_timeout
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.config.listen_addr
    }
}
