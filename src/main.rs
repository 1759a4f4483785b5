use static_serve::config::Config;
use static_serve::handler::RequestPipeline;
use static_serve::logger::Logger;
use static_serve::server::{self, ConnectionContext, ConnectionLimits};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::sync::Notify;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Config file path (without extension) from the first argument
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let cfg = Config::load_from(&config_path)?;
    let logger = Arc::new(Logger::from_config(&cfg.logging)?);

    // Tokio runtime sized by the workers setting
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
        logger.debug(&format!("[CONFIG] Using {workers} worker threads"));
    } else {
        logger.debug("[CONFIG] Using default worker threads (CPU cores)");
    }

    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg, logger))
}

async fn async_main(cfg: Config, logger: Arc<Logger>) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.get_socket_addr()?;
    let (listener, bound) = server::bind_with_retry(addr, cfg.server.port_retries, &logger)?;

    let pipeline = RequestPipeline::from_config(&cfg, &bound, Arc::clone(&logger))?;
    logger.log_server_start(&bound, pipeline.root(), &cfg);

    let shutdown = Arc::new(Notify::new());
    server::signal::start_signal_handler(Arc::clone(&shutdown), Arc::clone(&logger));

    let ctx = ConnectionContext {
        pipeline: Arc::new(pipeline),
        logger,
        limits: ConnectionLimits::from_config(&cfg.performance),
        active: Arc::new(AtomicUsize::new(0)),
    };

    // Use LocalSet for spawn_local support
    let local = tokio::task::LocalSet::new();
    local
        .run_until(server::start_server_loop(listener, ctx, shutdown))
        .await?;
    Ok(())
}
