use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cinelog_api::{
    config::{Config, StorageBackend},
    db::{create_pool, MemoryRepository, PgRepository, SharedRepository},
    routes::{create_router, AppState},
    services::IngestionQueue,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cinelog_api=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let repo: SharedRepository = match config.storage_backend()? {
        StorageBackend::Postgres => {
            let pool = create_pool(&config.database_url, config.db_max_connections).await?;
            let repo = PgRepository::new(pool);
            if config.run_migrations {
                repo.migrate().await?;
                tracing::info!("Database migrations applied");
            }
            Arc::new(repo)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Arc::new(MemoryRepository::new())
        }
    };

    let (ingestion, worker) = IngestionQueue::start(repo.clone(), &config.upload_dir).await?;

    let state = AppState::new(repo, ingestion)
        .with_page_size(config.page_size)
        .with_max_upload_bytes(config.max_upload_bytes);
    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %listener.local_addr()?, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
