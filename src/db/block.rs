use crate::db::DbError;
use crate::models::amount::parse_decimal;
use crate::models::block::{BlockRecord, BlockStatus};
use rust_decimal::Decimal;
use sqlx::{Pool, Row, Sqlite};

fn status_from_row(value: i64) -> Result<BlockStatus, DbError> {
    BlockStatus::from_i64(value).ok_or_else(|| DbError::InvalidColumn {
        column: "status",
        value: value.to_string(),
    })
}

pub async fn get_block(pool: &Pool<Sqlite>, slot: u64) -> Result<Option<BlockRecord>, DbError> {
    let row = sqlx::query("SELECT slot, block_height, block_time, status, sol_price FROM block WHERE slot = ?")
        .bind(slot as i64)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(BlockRecord {
        slot: row.get::<i64, _>("slot") as u64,
        block_height: row.get::<Option<i64>, _>("block_height").map(|h| h as u64),
        block_time: row.get("block_time"),
        status: status_from_row(row.get("status"))?,
        sol_price: parse_decimal(&row.get::<String, _>("sol_price")),
    }))
}

/// Insert or update a block row. A terminal status is only replaced by
/// another terminal status, so a late `failed` never demotes a processed slot.
pub async fn upsert_block(pool: &Pool<Sqlite>, block: &BlockRecord) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO block (slot, block_height, block_time, status, sol_price)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(slot) DO UPDATE SET
            block_height = COALESCE(excluded.block_height, block.block_height),
            block_time = COALESCE(excluded.block_time, block.block_time),
            status = excluded.status,
            sol_price = CASE WHEN excluded.sol_price != '0' THEN excluded.sol_price ELSE block.sol_price END,
            updated_at = strftime('%s', 'now')
        WHERE block.status NOT IN (?, ?) OR excluded.status IN (?, ?)
        "#,
    )
    .bind(block.slot as i64)
    .bind(block.block_height.map(|h| h as i64))
    .bind(block.block_time)
    .bind(block.status.as_i64())
    .bind(block.sol_price.to_string())
    .bind(BlockStatus::Processed.as_i64())
    .bind(BlockStatus::Skipped.as_i64())
    .bind(BlockStatus::Processed.as_i64())
    .bind(BlockStatus::Skipped.as_i64())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn set_status(pool: &Pool<Sqlite>, slot: u64, status: BlockStatus) -> Result<(), DbError> {
    upsert_block(pool, &BlockRecord::new(slot, status)).await
}

/// Slots left `processing` or `failed` below `below_slot`, oldest first.
pub async fn find_retry_slots(pool: &Pool<Sqlite>, below_slot: u64, limit: i64) -> Result<Vec<u64>, DbError> {
    let rows = sqlx::query("SELECT slot FROM block WHERE status IN (?, ?) AND slot < ? ORDER BY slot ASC LIMIT ?")
        .bind(BlockStatus::Processing.as_i64())
        .bind(BlockStatus::Failed.as_i64())
        .bind(below_slot as i64)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(|row| row.get::<i64, _>("slot") as u64).collect())
}

pub async fn earliest_failed_slot(pool: &Pool<Sqlite>) -> Result<Option<u64>, DbError> {
    let slot: Option<i64> = sqlx::query_scalar("SELECT MIN(slot) FROM block WHERE status = ?")
        .bind(BlockStatus::Failed.as_i64())
        .fetch_one(pool)
        .await?;

    Ok(slot.map(|s| s as u64))
}

pub async fn latest_processed_slot(pool: &Pool<Sqlite>) -> Result<Option<u64>, DbError> {
    let slot: Option<i64> = sqlx::query_scalar("SELECT MAX(slot) FROM block WHERE status = ?")
        .bind(BlockStatus::Processed.as_i64())
        .fetch_one(pool)
        .await?;

    Ok(slot.map(|s| s as u64))
}

/// Price recorded by the closest earlier block that has one.
pub async fn nearest_prior_price(pool: &Pool<Sqlite>, slot: u64) -> Result<Option<Decimal>, DbError> {
    let price: Option<String> = sqlx::query_scalar(
        "SELECT sol_price FROM block WHERE slot < ? AND sol_price != '0' ORDER BY slot DESC LIMIT 1",
    )
    .bind(slot as i64)
    .fetch_optional(pool)
    .await?;

    Ok(price.map(|p| parse_decimal(&p)).filter(|p| !p.is_zero()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_memory_connection;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_terminal_status_is_sticky() {
        let pool = establish_memory_connection().await.unwrap();

        set_status(&pool, 10, BlockStatus::Processing).await.unwrap();
        let mut record = BlockRecord::new(10, BlockStatus::Processed);
        record.block_time = Some(1_700_000_000);
        record.sol_price = dec!(201.5);
        upsert_block(&pool, &record).await.unwrap();

        set_status(&pool, 10, BlockStatus::Failed).await.unwrap();

        let stored = get_block(&pool, 10).await.unwrap().unwrap();
        assert_eq!(stored.status, BlockStatus::Processed);
        assert_eq!(stored.sol_price, dec!(201.5));
        assert_eq!(stored.block_height, None);
    }

    #[tokio::test]
    async fn test_retry_queries_and_prices() {
        let pool = establish_memory_connection().await.unwrap();

        set_status(&pool, 5, BlockStatus::Failed).await.unwrap();
        set_status(&pool, 6, BlockStatus::Processing).await.unwrap();
        set_status(&pool, 7, BlockStatus::Skipped).await.unwrap();
        set_status(&pool, 300, BlockStatus::Failed).await.unwrap();
        let mut priced = BlockRecord::new(8, BlockStatus::Processed);
        priced.sol_price = dec!(190);
        upsert_block(&pool, &priced).await.unwrap();

        assert_eq!(find_retry_slots(&pool, 200, 10).await.unwrap(), vec![5, 6]);
        assert_eq!(earliest_failed_slot(&pool).await.unwrap(), Some(5));
        assert_eq!(latest_processed_slot(&pool).await.unwrap(), Some(8));
        assert_eq!(nearest_prior_price(&pool, 9).await.unwrap(), Some(dec!(190)));
        assert_eq!(nearest_prior_price(&pool, 8).await.unwrap(), None);
    }
}
