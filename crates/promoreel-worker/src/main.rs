//! Marketing video worker binary.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use promoreel_queue::{JobLocks, JobQueue, RedisJobStore};
use promoreel_worker::{AppConfig, JobExecutor, Orchestrator, PipelineServices};

fn fail(message: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", message, err);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("promoreel=info".parse().expect("valid directive"));

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

    info!("Starting promoreel-worker");

    let config = AppConfig::from_env();
    info!("Worker config: {:?}", config.worker);

    if let Some(port) = config.metrics_port {
        if let Err(e) = PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
        {
            fail("Failed to install Prometheus exporter", e);
        }
        info!("Serving metrics on port {}", port);
    }

    let queue = JobQueue::new(config.queue.clone())
        .unwrap_or_else(|e| fail("Failed to create job queue", e));
    let store = RedisJobStore::new(&config.queue.redis_url)
        .unwrap_or_else(|e| fail("Failed to create job store", e));
    let locks = JobLocks::new(&config.queue.redis_url, config.worker.lock_ttl)
        .unwrap_or_else(|e| fail("Failed to create job locks", e));

    let services = PipelineServices::from_config(&config)
        .await
        .unwrap_or_else(|e| fail("Failed to build pipeline services", e));

    let orchestrator = Orchestrator::new(Arc::new(store), services, &config.worker);
    let executor = Arc::new(JobExecutor::new(config.worker.clone(), queue, locks, orchestrator));

    let shutdown_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            shutdown_executor.shutdown();
        }
    });

    if let Err(e) = executor.run().await {
        fail("Executor error", e);
    }

    info!("Worker shutdown complete");
}
