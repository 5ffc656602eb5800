use sqlx::SqlitePool;
use tracing::{debug, info};

const MIGRATIONS: &[(&str, &str)] = &[("001_assets", include_str!("../migrations/001_assets.sql"))];

/// Apply pending forward-only migrations, each inside its own transaction.
/// Returns the number of migrations applied by this call.
pub async fn run(pool: &SqlitePool) -> Result<usize, sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_ts INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let mut applied_now = 0;
    for (name, sql) in MIGRATIONS {
        let applied: Option<(String,)> =
            sqlx::query_as("SELECT name FROM _migrations WHERE name = ?")
                .bind(name)
                .fetch_optional(pool)
                .await?;

        if applied.is_some() {
            debug!(migration = name, "migration already applied");
            continue;
        }

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO _migrations (name, applied_ts) VALUES (?, ?)")
            .bind(name)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        applied_now += 1;
        info!(migration = name, "migration applied");
    }

    Ok(applied_now)
}
