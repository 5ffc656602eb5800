use vodpack_db::DbError;
use vodpack_db::repo::assets::{self, AssetRow};

async fn test_pool() -> sqlx::SqlitePool {
    let pool = vodpack_db::connect(":memory:").await.unwrap();
    vodpack_db::migrate::run(&pool).await.unwrap();
    pool
}

fn asset(name: &str, upload_ts: i64) -> AssetRow {
    let id = uuid::Uuid::new_v4().to_string();
    AssetRow {
        path: format!("uploads/{id}.mp4"),
        id,
        name: name.to_string(),
        upload_ts,
        duration: "5.000000".to_string(),
        thumbnail: None,
    }
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let pool = vodpack_db::connect(":memory:").await.unwrap();
    assert_eq!(vodpack_db::migrate::run(&pool).await.unwrap(), 1);
    assert_eq!(vodpack_db::migrate::run(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn insert_then_get() {
    let pool = test_pool().await;
    let mut row = asset("clip1", 1_700_000_000_000);
    row.thumbnail = Some(format!("static/thumbnails/{}.png", row.id));
    assets::insert_asset(&pool, &row).await.unwrap();

    let fetched = assets::get_asset(&pool, &row.id).await.unwrap().unwrap();
    assert_eq!(fetched, row);
    assert!(assets::asset_exists(&pool, &row.id).await.unwrap());
    assert!(assets::get_asset(&pool, "missing").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_id_is_rejected() {
    let pool = test_pool().await;
    let row = asset("clip1", 1);
    assets::insert_asset(&pool, &row).await.unwrap();

    let err = assets::insert_asset(&pool, &row).await.unwrap_err();
    assert!(matches!(err, DbError::Duplicate(ref id) if id == &row.id));
    assert_eq!(assets::list_assets(&pool).await.unwrap().len(), 1);
}

#[tokio::test]
async fn list_is_newest_first() {
    let pool = test_pool().await;
    for (name, ts) in [("a", 10), ("b", 30), ("c", 20), ("d", 30)] {
        assets::insert_asset(&pool, &asset(name, ts)).await.unwrap();
    }

    let rows = assets::list_assets(&pool).await.unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.windows(2).all(|w| w[0].upload_ts >= w[1].upload_ts));
    assert_eq!(rows.last().unwrap().name, "a");
}
