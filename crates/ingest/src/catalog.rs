use async_trait::async_trait;
use sqlx::SqlitePool;
use vodpack_db::DbError;
use vodpack_db::repo::assets::{self, AssetRow};

/// Durable record of committed assets. Insert-only.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert(&self, asset: &AssetRow) -> Result<(), DbError>;

    async fn get(&self, id: &str) -> Result<Option<AssetRow>, DbError>;

    /// All assets, newest upload first.
    async fn list_recent(&self) -> Result<Vec<AssetRow>, DbError>;

    async fn contains(&self, id: &str) -> Result<bool, DbError>;
}

/// [`CatalogStore`] over the `asset` table.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn insert(&self, asset: &AssetRow) -> Result<(), DbError> {
        assets::insert_asset(&self.pool, asset).await
    }

    async fn get(&self, id: &str) -> Result<Option<AssetRow>, DbError> {
        assets::get_asset(&self.pool, id).await
    }

    async fn list_recent(&self) -> Result<Vec<AssetRow>, DbError> {
        assets::list_assets(&self.pool).await
    }

    async fn contains(&self, id: &str) -> Result<bool, DbError> {
        assets::asset_exists(&self.pool, id).await
    }
}
