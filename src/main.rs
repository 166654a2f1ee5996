use std::sync::Arc;

use tracing::{error, info};

use microtrace::config::Config;
use microtrace::middleware::ChaosInjector;
use microtrace::observability::{Metrics, Tracer};
use microtrace::{logging, Pipeline, Server, VERSION};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_env()?;
    logging::init(&config.logging);

    info!(target: "microtrace.server", "Starting microtrace {}", VERSION);
    config.log_summary();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let tracer = build_tracer()?;
    let metrics = Arc::new(Metrics::from_config(&config.metrics)?);
    let chaos = Arc::new(ChaosInjector::new(config.chaos.clone())?);
    let pipeline = Arc::new(Pipeline::new(
        &config,
        Arc::clone(&metrics),
        tracer.clone(),
        chaos,
    ));

    let server = Arc::new(Server::new(config.server.clone(), pipeline, metrics));

    // Handle shutdown gracefully
    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "microtrace.server", "Shutting down...");
            signal_server.trigger_shutdown();
        }
    });

    // Returns after the accept loop stops and connections drain
    let result = server.run().await;
    if let Err(ref e) = result {
        error!(target: "microtrace.server", error = %e, "Server error");
    }

    // Flush buffered spans before exit
    tracer.shutdown();

    result.map_err(Into::into)
}

#[cfg(feature = "otel")]
fn build_tracer() -> Result<Tracer, Box<dyn std::error::Error + Send + Sync>> {
    use microtrace::observability::{init_tracing, OtelConfig};

    Ok(match init_tracing(&OtelConfig::from_env())? {
        Some(provider) => Tracer::new(provider),
        None => Tracer::noop(),
    })
}

#[cfg(not(feature = "otel"))]
fn build_tracer() -> Result<Tracer, Box<dyn std::error::Error + Send + Sync>> {
    info!(target: "microtrace.tracing", "Built without the otel feature, spans are not exported");
    Ok(Tracer::noop())
}
