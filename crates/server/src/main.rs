use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vodpack_ingest::catalog::SqliteCatalog;
use vodpack_ingest::layout::StorageLayout;
use vodpack_ingest::orchestrator::Ingestor;
use vodpack_server::config::ServerConfig;
use vodpack_transcoder::ffmpeg::FfmpegTranscoder;
use vodpack_transcoder::ffprobe::Ffprobe;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::from_env().context("invalid configuration")?;

    info!(db_path = %config.db_path, "connecting to database");
    let pool = vodpack_db::connect(&config.db_path)
        .await
        .context("failed to connect to database")?;
    let applied = vodpack_db::migrate::run(&pool)
        .await
        .context("failed to run migrations")?;
    info!(applied, "migrations complete");

    let layout = StorageLayout::new(&config.uploads_dir, &config.static_dir);
    layout
        .ensure_dirs()
        .await
        .context("failed to create storage directories")?;

    if let Some(hw) = config.transcoder.hw_accel {
        info!(codec = hw.video_codec(), "hardware encoder selected");
    }
    let prober = Arc::new(Ffprobe::new(config.transcoder.ffprobe_path.clone()));
    let transcoder = Arc::new(FfmpegTranscoder::new(config.transcoder.clone()));
    let catalog = Arc::new(SqliteCatalog::new(pool.clone()));
    let ingestor = Arc::new(
        Ingestor::new(layout, prober, transcoder, catalog).with_cleanup(config.cleanup),
    );

    // Spawn orphan sweep
    if let Some(interval) = config.sweep_interval {
        let ingestor = ingestor.clone();
        let grace = config.sweep_grace;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = ingestor.sweep_orphans(grace).await {
                    warn!(error = %e, "orphan sweep failed");
                }
            }
        });
    }

    let app_state = vodpack_server::state::AppState {
        db: pool,
        ingestor,
        max_upload_bytes: config.max_upload_bytes,
    };

    let app = vodpack_server::routes::build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .context("failed to bind")?;
    info!(addr = %config.bind_addr, "server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
