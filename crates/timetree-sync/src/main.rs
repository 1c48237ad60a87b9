use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

use timetree_sync::config::{MappingSource, ProcessEnv, Settings};
use timetree_sync::exporter::Exporter;
use timetree_sync::pollers;
use timetree_sync::routes::create_app;
use timetree_sync::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env first so RUST_LOG and the mapping keys it defines apply
    dotenvy::dotenv().ok();

    timetree_sync::init_tracing("timetree_sync=info,tower_http=info");

    tracing::info!("Starting timetree-sync service...");

    let settings = Arc::new(Settings::from_env()?);
    tracing::info!("TIMETREE_EMAIL set: {}", settings.email.is_some());
    tracing::info!("SYNC_INTERVAL_MINUTES: {}", settings.sync_interval_minutes);
    tracing::info!("Output dir: {}", settings.output_dir.display());

    tokio::fs::create_dir_all(&settings.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", settings.output_dir.display()))?;

    let mappings: Arc<dyn MappingSource> = Arc::new(ProcessEnv);

    // Start calendar sync background task
    let exporter = Exporter::new(settings.clone());
    let sync_handle = tokio::spawn(pollers::start_calendar_sync_task(
        exporter,
        mappings.clone(),
    ));

    let app = create_app(AppState::new(settings.clone(), mappings));

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sync_handle.abort();
    tracing::info!("timetree-sync stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping...");
}
