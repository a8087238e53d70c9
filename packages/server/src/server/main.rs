// Main entry point for the application submission service

use std::sync::Arc;

use anyhow::{Context, Result};
use automation::ai::OpenAi;
use automation::browser::ChromiumProvider;
use server_core::domains::applications::{ApplyService, PostgresApplicationStore};
use server_core::domains::collaborators::{PostgresJobPostingStore, PostgresProfileStore};
use server_core::domains::recipes::PostgresRecipeStore;
use server_core::kernel::jobs::{PostgresJobQueue, WorkerPool, WorkerPoolConfig};
use server_core::kernel::ApplicationRunner;
use server_core::server::build_app;
use server_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,automation=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting application submission service");

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let applications = Arc::new(PostgresApplicationStore::new(pool.clone()));
    let recipes = Arc::new(PostgresRecipeStore::new(pool.clone()));
    let profiles = Arc::new(PostgresProfileStore::new(pool.clone()));
    let postings = Arc::new(PostgresJobPostingStore::new(pool.clone()));
    let queue = Arc::new(PostgresJobQueue::new(pool.clone()));

    let browsers = Arc::new(match &config.browser_ws_url {
        Some(ws_url) => ChromiumProvider::remote(ws_url),
        None => ChromiumProvider::local(),
    });
    let ai = Arc::new(OpenAi::new(&config.openai_api_key));

    let runner = Arc::new(ApplicationRunner::new(
        applications.clone(),
        recipes,
        profiles,
        postings,
        browsers,
        ai,
        config.screenshot_dir.clone().into(),
    ));

    let shutdown = CancellationToken::new();
    let pool_config = WorkerPoolConfig {
        worker_count: config.worker_count,
        ..WorkerPoolConfig::default()
    };
    tracing::info!(workers = pool_config.worker_count, "Starting worker pool");
    let workers = tokio::spawn(
        WorkerPool::new(queue.clone(), runner, pool_config).run(shutdown.clone()),
    );

    let service = Arc::new(ApplyService::new(applications, queue));
    let app = build_app(pool, service);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for shutdown signal");
            tracing::info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    workers.await.context("Worker pool panicked")??;
    tracing::info!("Shutdown complete");
    Ok(())
}
