//! Pool metadata tables, one per DEX family, keyed by pool address.

use crate::db::DbError;
use crate::models::pool::{ClmmPoolInfo, CpmmPoolInfo, PoolInfo, PumpAmmInfo, RaydiumPool};
use sqlx::{Pool, Sqlite};

/// Table, key column and key value of a pool record.
pub fn pool_key(info: &PoolInfo) -> (&'static str, &'static str, &str) {
    match info {
        PoolInfo::RaydiumV4(pool) => ("raydium_pool", "amm_id", &pool.amm_id),
        PoolInfo::Cpmm(pool) => ("cpmm_pool_info", "pool_state", &pool.pool_state),
        PoolInfo::Clmm(pool) => (pool.version.table(), "pool_state", &pool.pool_state),
        PoolInfo::PumpAmm(pool) => ("pump_amm_info", "pool_account", &pool.pool_account),
    }
}

pub async fn pool_exists(pool: &Pool<Sqlite>, info: &PoolInfo) -> Result<bool, DbError> {
    let (table, column, key) = pool_key(info);
    let found: Option<i64> = sqlx::query_scalar(&format!("SELECT 1 FROM {table} WHERE {column} = ?"))
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

async fn insert_raydium(pool: &Pool<Sqlite>, p: &RaydiumPool) -> Result<u64, DbError> {
    let result = sqlx::query(
        r#"
        INSERT INTO raydium_pool
        (amm_id, amm_authority, amm_open_orders, amm_target_orders, pool_coin_token_account,
         pool_pc_token_account, serum_program_id, serum_market, serum_bids, serum_asks,
         serum_event_queue, serum_coin_vault_account, serum_pc_vault_account, serum_vault_signer,
         base_mint, quote_mint, tx_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(amm_id) DO NOTHING
        "#,
    )
    .bind(&p.amm_id)
    .bind(&p.amm_authority)
    .bind(&p.amm_open_orders)
    .bind(&p.amm_target_orders)
    .bind(&p.pool_coin_token_account)
    .bind(&p.pool_pc_token_account)
    .bind(&p.serum_program_id)
    .bind(&p.serum_market)
    .bind(&p.serum_bids)
    .bind(&p.serum_asks)
    .bind(&p.serum_event_queue)
    .bind(&p.serum_coin_vault_account)
    .bind(&p.serum_pc_vault_account)
    .bind(&p.serum_vault_signer)
    .bind(&p.base_mint)
    .bind(&p.quote_mint)
    .bind(&p.tx_hash)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_cpmm(pool: &Pool<Sqlite>, p: &CpmmPoolInfo, fee_rate: u64) -> Result<u64, DbError> {
    let result = sqlx::query(
        r#"
        INSERT INTO cpmm_pool_info
        (pool_state, amm_config, authority, input_vault, output_vault, input_token_program,
         output_token_program, input_token_mint, output_token_mint, observation_state,
         trade_fee_rate, tx_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(pool_state) DO NOTHING
        "#,
    )
    .bind(&p.pool_state)
    .bind(&p.amm_config)
    .bind(&p.authority)
    .bind(&p.input_vault)
    .bind(&p.output_vault)
    .bind(&p.input_token_program)
    .bind(&p.output_token_program)
    .bind(&p.input_token_mint)
    .bind(&p.output_token_mint)
    .bind(&p.observation_state)
    .bind(i64::try_from(fee_rate).unwrap_or(i64::MAX))
    .bind(&p.tx_hash)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_clmm(pool: &Pool<Sqlite>, p: &ClmmPoolInfo, fee_rate: u64) -> Result<u64, DbError> {
    let remaining = serde_json::to_string(&p.remaining_accounts).unwrap_or_else(|_| "[]".to_string());
    let table = p.version.table();
    let result = sqlx::query(&format!(
        r#"
        INSERT INTO {table}
        (pool_state, amm_config, input_vault, output_vault, observation_state, token_program,
         token_program_2022, memo_program, input_vault_mint, output_vault_mint, tick_array,
         remaining_accounts, trade_fee_rate, tx_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(pool_state) DO NOTHING
        "#
    ))
    .bind(&p.pool_state)
    .bind(&p.amm_config)
    .bind(&p.input_vault)
    .bind(&p.output_vault)
    .bind(&p.observation_state)
    .bind(&p.token_program)
    .bind(&p.token_program_2022)
    .bind(&p.memo_program)
    .bind(&p.input_vault_mint)
    .bind(&p.output_vault_mint)
    .bind(&p.tick_array)
    .bind(remaining)
    .bind(i64::try_from(fee_rate).unwrap_or(i64::MAX))
    .bind(&p.tx_hash)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_pump_amm(pool: &Pool<Sqlite>, p: &PumpAmmInfo) -> Result<u64, DbError> {
    let result = sqlx::query(
        r#"
        INSERT INTO pump_amm_info
        (pool_account, global_config, base_mint, quote_mint, pool_base_token_account,
         pool_quote_token_account, protocol_fee_recipient, protocol_fee_recipient_token_account,
         base_token_program, quote_token_program, tx_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(pool_account) DO NOTHING
        "#,
    )
    .bind(&p.pool_account)
    .bind(&p.global_config)
    .bind(&p.base_mint)
    .bind(&p.quote_mint)
    .bind(&p.pool_base_token_account)
    .bind(&p.pool_quote_token_account)
    .bind(&p.protocol_fee_recipient)
    .bind(&p.protocol_fee_recipient_token_account)
    .bind(&p.base_token_program)
    .bind(&p.quote_token_program)
    .bind(&p.tx_hash)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Insert a pool seen for the first time. A row inserted concurrently by
/// another writer is left as is; returns whether this call inserted.
pub async fn insert_pool(pool: &Pool<Sqlite>, info: &PoolInfo, fee_rate: u64) -> Result<bool, DbError> {
    let inserted = match info {
        PoolInfo::RaydiumV4(p) => insert_raydium(pool, p).await,
        PoolInfo::Cpmm(p) => insert_cpmm(pool, p, fee_rate).await,
        PoolInfo::Clmm(p) => insert_clmm(pool, p, fee_rate).await,
        PoolInfo::PumpAmm(p) => insert_pump_amm(pool, p).await,
    };

    match inserted {
        Ok(rows) => Ok(rows > 0),
        Err(e) if e.is_duplicate() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Refresh an existing pool. CLMM v1 rows also take the latest tick array
/// and remaining accounts, which change as the price moves.
pub async fn touch_pool(pool: &Pool<Sqlite>, info: &PoolInfo) -> Result<(), DbError> {
    match info {
        PoolInfo::Clmm(p) => {
            let remaining = serde_json::to_string(&p.remaining_accounts).unwrap_or_else(|_| "[]".to_string());
            let table = p.version.table();
            sqlx::query(&format!(
                "UPDATE {table} SET
                    tick_array = CASE WHEN ? != '' THEN ? ELSE tick_array END,
                    remaining_accounts = ?,
                    updated_at = strftime('%s', 'now')
                 WHERE pool_state = ?"
            ))
            .bind(&p.tick_array)
            .bind(&p.tick_array)
            .bind(remaining)
            .bind(&p.pool_state)
            .execute(pool)
            .await?;
        }
        _ => {
            let (table, column, key) = pool_key(info);
            sqlx::query(&format!("UPDATE {table} SET updated_at = strftime('%s', 'now') WHERE {column} = ?"))
                .bind(key)
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_memory_connection;
    use crate::models::pool::ClmmVersion;
    use sqlx::Row;

    fn clmm(tick_array: &str, remaining: Vec<String>) -> PoolInfo {
        PoolInfo::Clmm(ClmmPoolInfo {
            version: ClmmVersion::V1,
            pool_state: "state".to_string(),
            amm_config: "config".to_string(),
            input_vault: "in".to_string(),
            output_vault: "out".to_string(),
            observation_state: "obs".to_string(),
            token_program: "tp".to_string(),
            token_program_2022: "tp22".to_string(),
            memo_program: "memo".to_string(),
            input_vault_mint: "mint_in".to_string(),
            output_vault_mint: "mint_out".to_string(),
            tick_array: tick_array.to_string(),
            remaining_accounts: remaining,
            trade_fee_rate: 0,
            tx_hash: "sig".to_string(),
        })
    }

    #[tokio::test]
    async fn test_insert_once_then_touch() {
        let pool = establish_memory_connection().await.unwrap();
        let first = clmm("tick_a", vec![]);

        assert!(!pool_exists(&pool, &first).await.unwrap());
        assert!(insert_pool(&pool, &first, 100).await.unwrap());
        assert!(!insert_pool(&pool, &first, 100).await.unwrap());
        assert!(pool_exists(&pool, &first).await.unwrap());

        touch_pool(&pool, &clmm("tick_b", vec!["extra".to_string()])).await.unwrap();

        let row = sqlx::query("SELECT tick_array, remaining_accounts, trade_fee_rate FROM clmm_pool_info_v1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("tick_array"), "tick_b");
        assert_eq!(row.get::<String, _>("remaining_accounts"), "[\"extra\"]");
        assert_eq!(row.get::<i64, _>("trade_fee_rate"), 100);
    }

    #[tokio::test]
    async fn test_other_families() {
        let pool = establish_memory_connection().await.unwrap();
        let cpmm = PoolInfo::Cpmm(CpmmPoolInfo { pool_state: "cp".to_string(), ..Default::default() });
        let pump = PoolInfo::PumpAmm(PumpAmmInfo { pool_account: "pa".to_string(), ..Default::default() });
        let raydium = PoolInfo::RaydiumV4(RaydiumPool { amm_id: "amm".to_string(), ..Default::default() });

        for info in [&cpmm, &pump, &raydium] {
            assert!(insert_pool(&pool, info, 2500).await.unwrap());
            touch_pool(&pool, info).await.unwrap();
            assert!(pool_exists(&pool, info).await.unwrap());
        }
    }
}
