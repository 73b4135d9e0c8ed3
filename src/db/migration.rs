use crate::db::{DbError, INIT_SCHEMA};
use sqlx::SqlitePool;
use tracing::info;

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
    info!("Running database migrations...");

    sqlx::raw_sql(INIT_SCHEMA).execute(pool).await?;

    info!("Database migrations completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::db::connection::establish_memory_connection;
    use sqlx::Row;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = establish_memory_connection().await.unwrap();
        super::run_migrations(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(&pool)
            .await
            .unwrap()
            .iter()
            .map(|row| row.get("name"))
            .collect();

        for table in ["block", "pair", "token", "cpmm_pool_info", "clmm_pool_info_v1", "limit_order"] {
            assert!(tables.iter().any(|t| t == table), "missing {}", table);
        }
    }
}
