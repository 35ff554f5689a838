// Main entry point for the contact-form outreach worker

use std::sync::Arc;

use anyhow::{Context, Result};
use form_engine::{CaptchaSolver, DriverFactory, FormFillOrchestrator, OrchestratorConfig};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use worker_core::discovery::ContactPageDiscovery;
use worker_core::queue::SqsQueue;
use worker_core::solver::TwoCaptchaSolver;
use worker_core::webdriver::WebDriverFactory;
use worker_core::worker::spawn_shutdown_listener;
use worker_core::{Config, LeaseManager, PgJobStore, Worker, WorkerContext};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,worker_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting contact-form outreach worker");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    let store = Arc::new(PgJobStore::new(
        pool,
        config.max_retries,
        config.lock_timeout_minutes,
    ));

    let queue = SqsQueue::connect(
        config.queue_url.clone(),
        config.aws_region.clone(),
        config.queue_wait_seconds,
        config.visibility_timeout,
    )
    .await;
    tracing::info!(queue_url = %config.queue_url, "Queue adapter ready");

    let instance = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
    let ctx = WorkerContext::generate(instance);
    tracing::info!(worker_id = %ctx.worker_id, "Worker identity generated");
    let lease = LeaseManager::new(Arc::clone(&store), ctx);

    let solver: Option<Box<dyn CaptchaSolver>> = match config.captcha_api_key.clone() {
        Some(key) => Some(Box::new(TwoCaptchaSolver::new(key))),
        None => {
            tracing::info!("No CAPTCHA key configured; challenges will be skipped");
            None
        }
    };

    let drivers: Box<dyn DriverFactory> = Box::new(WebDriverFactory::new(config.webdriver_url.clone()));
    let orchestrator = FormFillOrchestrator::new(OrchestratorConfig::default());
    let discovery = ContactPageDiscovery::new()?;
    let shutdown = spawn_shutdown_listener();

    let worker = Worker::new(
        store, queue, lease, orchestrator, discovery, drivers, solver, shutdown,
    );
    worker.run().await
}
