//! Replay export worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use replay_queue::{EventPublisher, JobQueue};
use replay_worker::{metrics, JobExecutor, ProcessingContext, StreamReporter, WorkerConfig};

const DEFAULT_LOG_FILTER: &str = "info,replay_worker=info,replay_media=info,replay_queue=info";

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (rediss:// connections)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting replay-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        if let Err(e) = metrics::init_metrics(port) {
            warn!("Metrics exporter not started: {}", e);
        }
    }

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = match ProcessingContext::new(&config, &queue.config().consumer_name).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Failed to prepare export context: {}", e);
            std::process::exit(1);
        }
    };

    let publisher = EventPublisher::with_client(queue.client().clone(), queue.config());
    let reporter = Arc::new(StreamReporter::new(publisher));
    let executor = Arc::new(JobExecutor::new(config, queue, ctx, reporter));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_executor.shutdown();
        }
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
