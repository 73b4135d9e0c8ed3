//! Weekly token-holder shards `sol_token_account_{YYYY}{WW}` keyed by the
//! ISO week of the token's creation.

use crate::db::token::created_at_many;
use crate::db::{is_identifier, DbError};
use crate::models::token_account::{HolderStatus, TokenHolderBalance};
use chrono::{DateTime, Datelike};
use sqlx::{Pool, Sqlite};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

static SHARD_LOCK: Mutex<()> = Mutex::const_new(());

pub fn shard_name(created_at: i64) -> String {
    let date = DateTime::from_timestamp(created_at, 0).unwrap_or_default();
    let week = date.iso_week();
    format!("sol_token_account_{:04}{:02}", week.year(), week.week())
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
            token_address TEXT NOT NULL,
            owner TEXT NOT NULL,
            token_account_address TEXT NOT NULL,
            balance INTEGER NOT NULL,
            decimals INTEGER NOT NULL,
            slot INTEGER NOT NULL,
            status INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            UNIQUE (owner, token_account_address)
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_token ON {table}(token_address, balance);
        "#
    ))
    .execute(pool)
    .await?;

    Ok(())
}

/// Last occurrence of each `(owner, token_account_address)` wins.
pub fn dedup_latest(rows: Vec<TokenHolderBalance>) -> Vec<TokenHolderBalance> {
    let mut seen = HashSet::new();
    let mut kept: Vec<TokenHolderBalance> = rows
        .into_iter()
        .rev()
        .filter(|row| seen.insert((row.owner.clone(), row.token_account_address.clone())))
        .collect();
    kept.reverse();
    kept
}

/// Upsert holder balances. Rows for tokens without a token row are
/// dropped; the rest take their token's `created_at` and land in that
/// week's shard. Balance and slot only move forward in slot order.
pub async fn upsert_holders(pool: &Pool<Sqlite>, rows: Vec<TokenHolderBalance>) -> Result<u64, DbError> {
    let rows = dedup_latest(rows);
    if rows.is_empty() {
        return Ok(0);
    }

    let tokens: Vec<String> = rows
        .iter()
        .map(|row| row.token_address.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let created = created_at_many(pool, &tokens).await?;

    let mut shards: BTreeMap<String, Vec<TokenHolderBalance>> = BTreeMap::new();
    for mut row in rows {
        let Some(created_at) = created.get(&row.token_address) else {
            continue;
        };
        row.created_at = *created_at;
        shards.entry(shard_name(row.created_at)).or_default().push(row);
    }

    let mut written = 0;
    for (table, rows) in shards {
        ensure_shard(pool, &table).await?;

        let sql = format!(
            r#"
            INSERT INTO {table}
            (chain_id, token_address, owner, token_account_address, balance, decimals, slot, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner, token_account_address) DO UPDATE SET
                balance = excluded.balance,
                slot = excluded.slot,
                status = excluded.status,
                updated_at = strftime('%s', 'now')
            WHERE excluded.slot > {table}.slot
            "#
        );

        let mut tx = pool.begin().await?;
        for row in &rows {
            let result = sqlx::query(&sql)
                .bind(row.chain_id)
                .bind(&row.token_address)
                .bind(&row.owner)
                .bind(&row.token_account_address)
                .bind(i64::try_from(row.balance).unwrap_or(i64::MAX))
                .bind(row.decimals as i64)
                .bind(row.slot as i64)
                .bind(row.status.as_i64())
                .bind(row.created_at)
                .execute(&mut *tx)
                .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        debug!("Upserted {} holder row(s) into {}", rows.len(), table);
    }

    Ok(written)
}

pub async fn holder_balance(
    pool: &Pool<Sqlite>,
    table: &str,
    owner: &str,
    token_account: &str,
) -> Result<Option<(i64, i64, HolderStatus)>, DbError> {
    if !is_identifier(table) {
        return Err(DbError::InvalidColumn { column: "table", value: table.to_string() });
    }

    let row: Option<(i64, i64, i64)> = sqlx::query_as(&format!(
        "SELECT balance, slot, status FROM {table} WHERE owner = ? AND token_account_address = ?"
    ))
    .bind(owner)
    .bind(token_account)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(balance, slot, status)| {
        let status = if status == HolderStatus::Closed.as_i64() { HolderStatus::Closed } else { HolderStatus::Open };
        (balance, slot, status)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_memory_connection;
    use crate::db::token::{ensure_token, TokenRecord};
    use rust_decimal::Decimal;

    fn row(account: &str, balance: u64, slot: u64) -> TokenHolderBalance {
        TokenHolderBalance {
            chain_id: 100000,
            token_address: "mint".to_string(),
            owner: "owner".to_string(),
            token_account_address: account.to_string(),
            balance,
            decimals: 6,
            slot,
            status: HolderStatus::Open,
            created_at: 0,
        }
    }

    #[test]
    fn test_iso_week_shard() {
        // 2024-01-01 is a Monday in ISO week 1
        assert_eq!(shard_name(1_704_067_200), "sol_token_account_202401");
        // 2023-01-01 is a Sunday and belongs to 2022-W52
        assert_eq!(shard_name(1_672_531_200), "sol_token_account_202252");
    }

    #[test]
    fn test_dedup_keeps_last() {
        let rows = dedup_latest(vec![row("a", 1, 1), row("b", 2, 1), row("a", 3, 2)]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].token_account_address, "b");
        assert_eq!(rows[1].balance, 3);
    }

    #[tokio::test]
    async fn test_upsert_only_moves_forward() {
        let pool = establish_memory_connection().await.unwrap();
        ensure_token(
            &pool,
            &TokenRecord {
                address: "mint".to_string(),
                chain_id: 100000,
                decimals: 6,
                total_supply: Decimal::ZERO,
                created_at: 1_704_067_200,
            },
        )
        .await
        .unwrap();

        let mut unknown = row("c", 9, 1);
        unknown.token_address = "unlisted".to_string();

        upsert_holders(&pool, vec![row("a", 100, 50), unknown]).await.unwrap();
        upsert_holders(&pool, vec![row("a", 5, 40)]).await.unwrap();
        let table = "sol_token_account_202401";
        assert_eq!(holder_balance(&pool, table, "owner", "a").await.unwrap(), Some((100, 50, HolderStatus::Open)));

        let mut closed = row("a", 0, 60);
        closed.status = HolderStatus::Closed;
        upsert_holders(&pool, vec![closed]).await.unwrap();
        assert_eq!(holder_balance(&pool, table, "owner", "a").await.unwrap(), Some((0, 60, HolderStatus::Closed)));
        assert_eq!(holder_balance(&pool, table, "owner", "c").await.unwrap(), None);
    }
}
