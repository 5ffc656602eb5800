use std::sync::Arc;

use sqlx::SqlitePool;
use vodpack_ingest::catalog::CatalogStore;
use vodpack_ingest::layout::StorageLayout;
use vodpack_ingest::orchestrator::Ingestor;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub ingestor: Arc<Ingestor>,
    /// Largest accepted `POST /upload` body.
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn catalog(&self) -> &dyn CatalogStore {
        self.ingestor.catalog().as_ref()
    }

    pub fn layout(&self) -> &StorageLayout {
        self.ingestor.layout()
    }
}
