//! Generation pipeline worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storygen_gensvc::GenClient;
use storygen_queue::{JobQueue, ProgressChannel};
use storygen_store::PgJobStore;
use storygen_worker::{remote_registry, JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("storygen=info".parse().unwrap())
        .add_directive("sqlx=warn".parse().unwrap());

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

    info!("Starting storygen-worker");

    // Optional worker identifier as the first CLI argument
    let worker_arg = std::env::args().nth(1);
    let config = WorkerConfig::from_env(worker_arg);
    info!("Worker config: {:?}", config);

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = queue.init().await {
        error!("Failed to initialize queue: {}", e);
        std::process::exit(1);
    }

    let store = match PgJobStore::from_env().await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to connect to job store: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = store.run_migrations().await {
        error!("Failed to run store migrations: {}", e);
        std::process::exit(1);
    }

    let progress = match ProgressChannel::from_env() {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to create progress channel: {}", e);
            std::process::exit(1);
        }
    };

    let gen_client = match GenClient::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Failed to create generation client: {}", e);
            std::process::exit(1);
        }
    };

    let executor = Arc::new(JobExecutor::new(
        config,
        Arc::new(queue),
        Arc::new(store),
        Arc::new(progress),
        remote_registry(gen_client),
    ));

    // SIGTERM/SIGINT stop new dequeues and requeue any in-flight job.
    let signal_target = Arc::clone(&executor);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Received shutdown signal");
        signal_target.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
}
