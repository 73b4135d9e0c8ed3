//! Daily trade shards `trade_{YYYY}_{MM}_{DD}`.

use crate::constants::TRADE_BATCH_SIZE;
use crate::db::{is_identifier, DbError};
use crate::models::trade::Trade;
use chrono::{DateTime, Datelike};
use sqlx::{Pool, Sqlite};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Serializes shard creation.
static SHARD_LOCK: Mutex<()> = Mutex::const_new(());
/// Taken for the single retry of a batch that hit a busy database.
static WRITE_LOCK: Mutex<()> = Mutex::const_new(());

/// Shard a block time (unix seconds, UTC) falls into.
pub fn shard_name(block_time: i64) -> String {
    let date = DateTime::from_timestamp(block_time, 0).unwrap_or_default();
    format!("trade_{:04}_{:02}_{:02}", date.year(), date.month(), date.day())
}

pub async fn ensure_shard(pool: &Pool<Sqlite>, table: &str) -> Result<(), DbError> {
    if !is_identifier(table) {
        return Err(DbError::InvalidColumn { column: "table", value: table.to_string() });
    }

    let _guard = SHARD_LOCK.lock().await;
    sqlx::raw_sql(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chain_id INTEGER NOT NULL,
            hash_id TEXT NOT NULL,
            log_index INTEGER NOT NULL,
            pair_addr TEXT NOT NULL,
            tx_hash TEXT NOT NULL,
            maker TEXT NOT NULL,
            "to" TEXT NOT NULL,
            trade_type TEXT NOT NULL,
            swap_name TEXT NOT NULL,
            token_addr TEXT NOT NULL,
            base_token_amount TEXT NOT NULL,
            token_amount TEXT NOT NULL,
            base_token_price_usd TEXT NOT NULL,
            total_usd TEXT NOT NULL,
            token_price_usd TEXT NOT NULL,
            block_num INTEGER NOT NULL,
            block_time INTEGER NOT NULL,
            clamp INTEGER NOT NULL DEFAULT 0,
            sort_key INTEGER NOT NULL,
            created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            UNIQUE (hash_id, log_index)
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_pair_sort ON {table}(pair_addr, sort_key);
        "#
    ))
    .execute(pool)
    .await?;

    Ok(())
}

async fn insert_batch(pool: &Pool<Sqlite>, table: &str, trades: &[&Trade]) -> Result<u64, DbError> {
    let sql = format!(
        r#"
        INSERT INTO {table}
        (chain_id, hash_id, log_index, pair_addr, tx_hash, maker, "to", trade_type, swap_name, token_addr,
         base_token_amount, token_amount, base_token_price_usd, total_usd, token_price_usd,
         block_num, block_time, clamp, sort_key)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(hash_id, log_index) DO NOTHING
        "#
    );

    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for trade in trades {
        let result = sqlx::query(&sql)
            .bind(trade.chain_id)
            .bind(&trade.hash_id)
            .bind(trade.log_index as i64)
            .bind(&trade.pair_addr)
            .bind(&trade.tx_hash)
            .bind(&trade.maker)
            .bind(&trade.to)
            .bind(trade.trade_type.as_str())
            .bind(trade.swap_name.as_str())
            .bind(&trade.token_addr)
            .bind(trade.base_token_amount.to_string())
            .bind(trade.token_amount.to_string())
            .bind(trade.base_token_price_usd.to_string())
            .bind(trade.total_usd.to_string())
            .bind(trade.token_price_usd.to_string())
            .bind(trade.block_num as i64)
            .bind(trade.block_time)
            .bind(trade.clamp)
            .bind(trade.sort_key())
            .execute(&mut *tx)
            .await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Write trades into their daily shards in batches. Rows already present
/// for the same `(hash_id, log_index)` are left untouched. A batch that
/// hits a busy database is retried once under the process-wide write lock.
pub async fn insert_trades(pool: &Pool<Sqlite>, trades: &[Trade]) -> Result<u64, DbError> {
    let mut shards: BTreeMap<String, Vec<&Trade>> = BTreeMap::new();
    for trade in trades {
        shards.entry(shard_name(trade.block_time)).or_default().push(trade);
    }

    let mut inserted = 0;
    for (table, rows) in shards {
        ensure_shard(pool, &table).await?;

        for batch in rows.chunks(TRADE_BATCH_SIZE) {
            inserted += match insert_batch(pool, &table, batch).await {
                Err(e) if e.is_deadlock() => {
                    warn!("Trade batch on {} hit a busy database, retrying: {}", table, e);
                    let _guard = WRITE_LOCK.lock().await;
                    insert_batch(pool, &table, batch).await?
                }
                result => result?,
            };
        }
    }

    debug!("Inserted {} of {} trades", inserted, trades.len());
    Ok(inserted)
}

pub async fn count_trades(pool: &Pool<Sqlite>, table: &str) -> Result<i64, DbError> {
    if !is_identifier(table) {
        return Err(DbError::InvalidColumn { column: "table", value: table.to_string() });
    }
    let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_memory_connection;
    use crate::models::trade::{SwapName, TradeType};

    fn trade(slot: u64, tx_index: u32, log_index: u32) -> Trade {
        let mut trade = Trade::new_sol(SwapName::RaydiumV4, TradeType::Buy);
        trade.slot = slot;
        trade.block_num = slot;
        trade.block_time = 1_706_659_200; // 2024-01-31
        trade.tx_index = tx_index;
        trade.log_index = log_index;
        trade.hash_id = Trade::make_hash_id(slot, tx_index);
        trade.pair_addr = "pair".to_string();
        trade
    }

    #[test]
    fn test_shard_name() {
        assert_eq!(shard_name(1_706_659_200), "trade_2024_01_31");
        assert_eq!(shard_name(0), "trade_1970_01_01");
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let pool = establish_memory_connection().await.unwrap();
        let trades = vec![trade(100, 1, 0), trade(100, 1, 1), trade(100, 2, 0)];

        assert_eq!(insert_trades(&pool, &trades).await.unwrap(), 3);
        assert_eq!(insert_trades(&pool, &trades).await.unwrap(), 0);
        assert_eq!(count_trades(&pool, "trade_2024_01_31").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_large_batches_are_chunked() {
        let pool = establish_memory_connection().await.unwrap();
        let trades: Vec<Trade> = (0..(TRADE_BATCH_SIZE as u32 + 10)).map(|i| trade(7, i, 0)).collect();

        assert_eq!(insert_trades(&pool, &trades).await.unwrap(), trades.len() as u64);
    }
}
