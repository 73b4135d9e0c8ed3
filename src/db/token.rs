use crate::db::DbError;
use crate::models::amount::parse_decimal;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub address: String,
    pub chain_id: i64,
    pub decimals: u8,
    /// In token units.
    pub total_supply: Decimal,
    pub created_at: i64,
}

pub async fn get_token(pool: &Pool<Sqlite>, address: &str) -> Result<Option<TokenRecord>, DbError> {
    let row = sqlx::query("SELECT address, chain_id, decimals, total_supply, created_at FROM token WHERE address = ?")
        .bind(address)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| TokenRecord {
        address: row.get("address"),
        chain_id: row.get("chain_id"),
        decimals: row.get::<i64, _>("decimals") as u8,
        total_supply: parse_decimal(&row.get::<String, _>("total_supply")),
        created_at: row.get("created_at"),
    }))
}

/// Insert a token row unless one exists; returns the stored row.
pub async fn ensure_token(pool: &Pool<Sqlite>, token: &TokenRecord) -> Result<TokenRecord, DbError> {
    sqlx::query(
        "INSERT INTO token (address, chain_id, decimals, total_supply, created_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(address) DO NOTHING",
    )
    .bind(&token.address)
    .bind(token.chain_id)
    .bind(token.decimals as i64)
    .bind(token.total_supply.to_string())
    .bind(token.created_at)
    .execute(pool)
    .await?;

    get_token(pool, &token.address)
        .await?
        .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))
}

pub async fn update_total_supply(pool: &Pool<Sqlite>, address: &str, total_supply: Decimal) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE token SET total_supply = ?, updated_at = strftime('%s', 'now') WHERE address = ?",
    )
    .bind(total_supply.to_string())
    .bind(address)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// `created_at` of every listed token that has a row.
pub async fn created_at_many(pool: &Pool<Sqlite>, addresses: &[String]) -> Result<HashMap<String, i64>, DbError> {
    let mut found = HashMap::new();
    for address in addresses {
        let created_at: Option<i64> = sqlx::query_scalar("SELECT created_at FROM token WHERE address = ?")
            .bind(address)
            .fetch_optional(pool)
            .await?;
        if let Some(created_at) = created_at {
            found.insert(address.clone(), created_at);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_memory_connection;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_ensure_keeps_first_row() {
        let pool = establish_memory_connection().await.unwrap();
        let token = TokenRecord {
            address: "mint".to_string(),
            chain_id: 100000,
            decimals: 6,
            total_supply: dec!(1000),
            created_at: 1_700_000_000,
        };

        let stored = ensure_token(&pool, &token).await.unwrap();
        assert_eq!(stored, token);

        let later = TokenRecord { created_at: 1_800_000_000, ..token.clone() };
        assert_eq!(ensure_token(&pool, &later).await.unwrap().created_at, 1_700_000_000);

        assert!(update_total_supply(&pool, "mint", dec!(2500.5)).await.unwrap());
        assert!(!update_total_supply(&pool, "other", dec!(1)).await.unwrap());
        assert_eq!(get_token(&pool, "mint").await.unwrap().unwrap().total_supply, dec!(2500.5));

        let created = created_at_many(&pool, &["mint".to_string(), "other".to_string()]).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created["mint"], 1_700_000_000);
    }
}
