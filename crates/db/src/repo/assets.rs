use sqlx::SqlitePool;

use crate::DbError;

/// One committed asset as stored in the `asset` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRow {
    pub id: String,
    pub name: String,
    /// Location of the raw upload.
    pub path: String,
    /// Upload time, unix milliseconds.
    pub upload_ts: i64,
    pub duration: String,
    pub thumbnail: Option<String>,
}

type AssetTuple = (String, String, String, i64, String, Option<String>);

const SELECT_COLUMNS: &str = "SELECT id, name, path, upload_ts, duration, thumbnail FROM asset";

/// Insert a new asset. Records are never updated; a repeated id is reported
/// as [`DbError::Duplicate`].
pub async fn insert_asset(pool: &SqlitePool, asset: &AssetRow) -> Result<(), DbError> {
    let result = sqlx::query(
        "INSERT INTO asset (id, name, path, upload_ts, duration, thumbnail) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&asset.id)
    .bind(&asset.name)
    .bind(&asset.path)
    .bind(asset.upload_ts)
    .bind(&asset.duration)
    .bind(asset.thumbnail.as_deref())
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(DbError::Duplicate(asset.id.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn get_asset(pool: &SqlitePool, id: &str) -> Result<Option<AssetRow>, DbError> {
    let row: Option<AssetTuple> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(row_to_asset))
}

/// All assets, newest upload first.
pub async fn list_assets(pool: &SqlitePool) -> Result<Vec<AssetRow>, DbError> {
    let rows: Vec<AssetTuple> =
        sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY upload_ts DESC, id DESC"))
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(row_to_asset).collect())
}

pub async fn asset_exists(pool: &SqlitePool, id: &str) -> Result<bool, DbError> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM asset WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

fn row_to_asset(r: AssetTuple) -> AssetRow {
    AssetRow {
        id: r.0,
        name: r.1,
        path: r.2,
        upload_ts: r.3,
        duration: r.4,
        thumbnail: r.5,
    }
}
