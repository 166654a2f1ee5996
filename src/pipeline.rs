//! Request pipeline: routing plus the telemetry middleware chain.

use std::net::IpAddr;
use std::sync::Arc;

use http::Method;

use crate::config::Config;
use crate::core::{Context, Request, Response};
use crate::handler::{
    AnalyzeHandler, BodyTooLarge, HealthHandler, MetricsHandler, Router, WorkerService,
};
use crate::middleware::{
    AccessLogMiddleware, ChaosInjector, ChaosMiddleware, MiddlewareChain, RequestIdMiddleware,
    TracingMiddleware,
};
use crate::observability::{Metrics, Tracer};

/// Everything a request goes through between the socket and the socket.
pub struct Pipeline {
    chain: MiddlewareChain,
    router: Router,
}

impl Pipeline {
    /// Build the standard pipeline and routes from shared handles.
    pub fn new(
        config: &Config,
        metrics: Arc<Metrics>,
        tracer: Tracer,
        chaos: Arc<ChaosInjector>,
    ) -> Self {
        let chain = MiddlewareChain::new()
            .add(RequestIdMiddleware::new(&config.server.request_id_header))
            .add(TracingMiddleware::new(tracer.clone(), config.tracing.clone()))
            .add(AccessLogMiddleware::new(metrics.clone()))
            .add(ChaosMiddleware::new(chaos));

        let worker = WorkerService::new(tracer, config.server.worker_delay);
        let router = Router::new()
            .route(Method::POST, "/analyze", AnalyzeHandler::new(worker))
            .route(Method::GET, "/metrics", MetricsHandler::new(metrics))
            .route(Method::GET, "/health", HealthHandler);

        Self::from_parts(chain, router)
    }

    pub fn from_parts(chain: MiddlewareChain, router: Router) -> Self {
        Self { chain, router }
    }

    /// Route and process one request. Always yields a response.
    pub async fn handle(&self, req: Request, client_ip: IpAddr) -> Response {
        let route = self.router.resolve(req.method(), req.path());
        let mut ctx = Context::new(client_ip, &req, route.template);
        self.chain.process(req, &mut ctx, route.handler).await
    }

    /// Answer 413 for a request whose body was over the limit. `req` carries
    /// the original head with an empty body; the route label, request id,
    /// span and metrics are handled as for any other request.
    pub async fn reject_oversized(&self, req: Request, client_ip: IpAddr) -> Response {
        let route = self.router.resolve(req.method(), req.path());
        let mut ctx = Context::new(client_ip, &req, route.template);
        self.chain.process(req, &mut ctx, &BodyTooLarge).await
    }

    pub fn chain(&self) -> &MiddlewareChain {
        &self.chain
    }

    pub fn router(&self) -> &Router {
        &self.router
    }
}
