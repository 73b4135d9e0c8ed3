use crate::db::DbError;
use crate::models::amount::{parse_decimal, saturating_mul};
use crate::models::pair::Pair;
use crate::models::trade::{PumpStatus, SwapName, Trade};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

/// Pool liquidity in USD. Bonding curves are single sided, so their SOL
/// side is counted twice.
pub fn liquidity_usd(pair: &Pair) -> Decimal {
    if pair.name == SwapName::PumpFun.as_str() {
        return saturating_mul(saturating_mul(pair.current_base_token_amount, pair.base_token_price), Decimal::TWO);
    }
    saturating_mul(pair.current_base_token_amount, pair.base_token_price)
        .saturating_add(saturating_mul(pair.current_token_amount, pair.token_price))
}

/// Recompute liquidity, fdv and market cap. Without a known supply both
/// caps fall back to liquidity.
pub fn refresh_valuation(pair: &mut Pair, trade: &Trade, total_supply: Decimal) {
    pair.liquidity = liquidity_usd(pair);
    if pair.liquidity.is_zero() {
        if let Some(liquidity) = trade.position_liquidity {
            pair.liquidity = liquidity;
        }
    }

    if total_supply > Decimal::ZERO && !pair.token_price.is_zero() {
        pair.fdv = saturating_mul(pair.token_price, total_supply);
        pair.mkt_cap = pair.fdv;
    } else {
        pair.fdv = pair.liquidity;
        pair.mkt_cap = pair.liquidity;
    }
}

/// Move a stored pair forward to a newer trade.
pub fn apply_trade(pair: &mut Pair, trade: &Trade, total_supply: Decimal) {
    pair.current_base_token_amount = trade.current_base_token_in_pool_amount;
    pair.current_token_amount = trade.current_token_in_pool_amount;
    pair.base_token_price = trade.base_token_price_usd;
    if !trade.token_price_usd.is_zero() {
        pair.token_price = trade.token_price_usd;
    }
    pair.block_num = trade.block_num;
    pair.block_time = trade.block_time;
    pair.slot = trade.slot;
    pair.latest_trade_time = pair.latest_trade_time.max(trade.block_time);

    if pair.init_base_token_amount.is_zero() && trade.init_base_token_amount > Decimal::ZERO {
        pair.init_base_token_amount = trade.init_base_token_amount;
        pair.init_token_amount = trade.init_token_amount;
    }

    if let Some(pump) = &trade.pump {
        pair.pump_point = pump.point;
        pair.pump_status = pump.status;
        pair.pump_virtual_base_token_reserves = pump.virtual_base_reserves;
        pair.pump_virtual_token_reserves = pump.virtual_token_reserves;
    }

    refresh_valuation(pair, trade, total_supply);
}

fn pair_from_row(row: &SqliteRow) -> Pair {
    let decimal = |column: &str| parse_decimal(&row.get::<String, _>(column));

    Pair {
        chain_id: row.get("chain_id"),
        address: row.get("address"),
        name: row.get("name"),
        base_token_address: row.get("base_token_address"),
        base_token_decimals: row.get::<i64, _>("base_token_decimals") as u8,
        base_token_symbol: row.get("base_token_symbol"),
        token_address: row.get("token_address"),
        token_decimals: row.get::<i64, _>("token_decimals") as u8,
        token_symbol: row.get("token_symbol"),
        init_base_token_amount: decimal("init_base_token_amount"),
        init_token_amount: decimal("init_token_amount"),
        current_base_token_amount: decimal("current_base_token_amount"),
        current_token_amount: decimal("current_token_amount"),
        base_token_price: decimal("base_token_price"),
        token_price: decimal("token_price"),
        liquidity: decimal("liquidity"),
        fdv: decimal("fdv"),
        mkt_cap: decimal("mkt_cap"),
        block_num: row.get::<i64, _>("block_num") as u64,
        block_time: row.get("block_time"),
        slot: row.get::<i64, _>("slot") as u64,
        latest_trade_time: row.get("latest_trade_time"),
        pump_point: decimal("pump_point"),
        pump_status: PumpStatus::from_i64(row.get("pump_status")),
        pump_virtual_base_token_reserves: decimal("pump_virtual_base_token_reserves"),
        pump_virtual_token_reserves: decimal("pump_virtual_token_reserves"),
    }
}

pub async fn get_pair(pool: &Pool<Sqlite>, chain_id: i64, address: &str) -> Result<Option<Pair>, DbError> {
    let row = sqlx::query("SELECT * FROM pair WHERE chain_id = ? AND address = ?")
        .bind(chain_id)
        .bind(address)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(pair_from_row))
}

/// Insert a first observation. Returns false when the row already existed.
pub async fn insert_pair(pool: &Pool<Sqlite>, pair: &Pair) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        INSERT INTO pair
        (chain_id, address, name, base_token_address, base_token_decimals, base_token_symbol,
         token_address, token_decimals, token_symbol, init_base_token_amount, init_token_amount,
         current_base_token_amount, current_token_amount, base_token_price, token_price,
         liquidity, fdv, mkt_cap, block_num, block_time, slot, latest_trade_time,
         pump_point, pump_status, pump_virtual_base_token_reserves, pump_virtual_token_reserves)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(chain_id, address) DO NOTHING
        "#,
    )
    .bind(pair.chain_id)
    .bind(&pair.address)
    .bind(&pair.name)
    .bind(&pair.base_token_address)
    .bind(pair.base_token_decimals as i64)
    .bind(&pair.base_token_symbol)
    .bind(&pair.token_address)
    .bind(pair.token_decimals as i64)
    .bind(&pair.token_symbol)
    .bind(pair.init_base_token_amount.to_string())
    .bind(pair.init_token_amount.to_string())
    .bind(pair.current_base_token_amount.to_string())
    .bind(pair.current_token_amount.to_string())
    .bind(pair.base_token_price.to_string())
    .bind(pair.token_price.to_string())
    .bind(pair.liquidity.to_string())
    .bind(pair.fdv.to_string())
    .bind(pair.mkt_cap.to_string())
    .bind(pair.block_num as i64)
    .bind(pair.block_time)
    .bind(pair.slot as i64)
    .bind(pair.latest_trade_time)
    .bind(pair.pump_point.to_string())
    .bind(pair.pump_status.as_i64())
    .bind(pair.pump_virtual_base_token_reserves.to_string())
    .bind(pair.pump_virtual_token_reserves.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Write a pair back only if its slot is newer than the stored one.
pub async fn update_pair_if_newer(pool: &Pool<Sqlite>, pair: &Pair) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE pair SET
            current_base_token_amount = ?, current_token_amount = ?,
            base_token_price = ?, token_price = ?, liquidity = ?, fdv = ?, mkt_cap = ?,
            init_base_token_amount = ?, init_token_amount = ?,
            block_num = ?, block_time = ?, slot = ?, latest_trade_time = ?,
            pump_point = ?, pump_status = ?,
            pump_virtual_base_token_reserves = ?, pump_virtual_token_reserves = ?,
            updated_at = strftime('%s', 'now')
        WHERE chain_id = ? AND address = ? AND slot < ?
        "#,
    )
    .bind(pair.current_base_token_amount.to_string())
    .bind(pair.current_token_amount.to_string())
    .bind(pair.base_token_price.to_string())
    .bind(pair.token_price.to_string())
    .bind(pair.liquidity.to_string())
    .bind(pair.fdv.to_string())
    .bind(pair.mkt_cap.to_string())
    .bind(pair.init_base_token_amount.to_string())
    .bind(pair.init_token_amount.to_string())
    .bind(pair.block_num as i64)
    .bind(pair.block_time)
    .bind(pair.slot as i64)
    .bind(pair.latest_trade_time)
    .bind(pair.pump_point.to_string())
    .bind(pair.pump_status.as_i64())
    .bind(pair.pump_virtual_base_token_reserves.to_string())
    .bind(pair.pump_virtual_token_reserves.to_string())
    .bind(pair.chain_id)
    .bind(&pair.address)
    .bind(pair.slot as i64)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Upsert the pair a trade belongs to and return the row as stored.
/// First sight inserts; later trades update only from a strictly newer slot.
pub async fn save_pair(pool: &Pool<Sqlite>, trade: &Trade, total_supply: Decimal) -> Result<Pair, DbError> {
    let existing = get_pair(pool, trade.chain_id, &trade.pair_addr).await?;

    let mut pair = match existing {
        Some(pair) => pair,
        None => {
            let mut pair = Pair::from_trade(trade);
            refresh_valuation(&mut pair, trade, total_supply);
            if insert_pair(pool, &pair).await? {
                debug!(pair = %pair.address, slot = pair.slot, "Inserted pair");
                return Ok(pair);
            }
            // Lost the race to another writer
            get_pair(pool, trade.chain_id, &trade.pair_addr)
                .await?
                .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))?
        }
    };

    if trade.slot > pair.slot {
        apply_trade(&mut pair, trade, total_supply);
        if update_pair_if_newer(pool, &pair).await? {
            debug!(pair = %pair.address, slot = pair.slot, "Updated pair");
        }
    }

    Ok(pair)
}
