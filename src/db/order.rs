use crate::db::DbError;
use crate::models::amount::parse_decimal;
use crate::models::order::{LimitOrder, OrderStatus, Side, TriggerKind};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

fn order_from_row(row: &SqliteRow) -> Result<LimitOrder, DbError> {
    let side = match row.get::<String, _>("side").as_str() {
        "buy" => Side::Buy,
        "sell" => Side::Sell,
        other => return Err(DbError::InvalidColumn { column: "side", value: other.to_string() }),
    };
    let trigger_kind = match row.get::<String, _>("trigger_kind").as_str() {
        "price" => TriggerKind::Price,
        "market_cap" => TriggerKind::MarketCap,
        "trailing" => TriggerKind::Trailing,
        other => return Err(DbError::InvalidColumn { column: "trigger_kind", value: other.to_string() }),
    };
    let status_text: String = row.get("status");
    let status = OrderStatus::parse(&status_text)
        .ok_or(DbError::InvalidColumn { column: "status", value: status_text })?;

    Ok(LimitOrder {
        id: row.get("id"),
        token_address: row.get("token_address"),
        chain_id: row.get("chain_id"),
        side,
        base_price: parse_decimal(&row.get::<String, _>("base_price")),
        trigger_kind,
        trailing_percent: parse_decimal(&row.get::<String, _>("trailing_percent")),
        status,
        created_at: row.get("created_at"),
    })
}

/// Store a new waiting order and return its id.
pub async fn insert_order(pool: &Pool<Sqlite>, order: &LimitOrder) -> Result<i64, DbError> {
    let result = sqlx::query(
        "INSERT INTO limit_order (token_address, chain_id, side, base_price, trigger_kind, trailing_percent, status)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&order.token_address)
    .bind(order.chain_id)
    .bind(order.side.as_str())
    .bind(order.base_price.to_string())
    .bind(order.trigger_kind.as_str())
    .bind(order.trailing_percent.to_string())
    .bind(order.status.as_str())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_order(pool: &Pool<Sqlite>, id: i64) -> Result<Option<LimitOrder>, DbError> {
    let row = sqlx::query("SELECT * FROM limit_order WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(order_from_row).transpose()
}

/// Conditional `waiting -> processing`. Returns the affected row count;
/// zero means another matcher already claimed the order or it left the
/// waiting state.
pub async fn try_mark_processing(pool: &Pool<Sqlite>, id: i64) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE limit_order SET status = ?, updated_at = strftime('%s', 'now') WHERE id = ? AND status = ?",
    )
    .bind(OrderStatus::Processing.as_str())
    .bind(id)
    .bind(OrderStatus::Waiting.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_memory_connection;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mark_processing_fires_once() {
        let pool = establish_memory_connection().await.unwrap();
        let order = LimitOrder {
            id: 0,
            token_address: "T".to_string(),
            chain_id: 100000,
            side: Side::Buy,
            base_price: dec!(1.00),
            trigger_kind: TriggerKind::Price,
            trailing_percent: dec!(0),
            status: OrderStatus::Waiting,
            created_at: 0,
        };
        let id = insert_order(&pool, &order).await.unwrap();

        assert_eq!(try_mark_processing(&pool, id).await.unwrap(), 1);
        assert_eq!(try_mark_processing(&pool, id).await.unwrap(), 0);

        let stored = get_order(&pool, id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Processing);
        assert_eq!(stored.base_price, dec!(1.00));
        assert_eq!(stored.side, Side::Buy);
    }
}
