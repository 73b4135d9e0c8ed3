use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::trade::{PumpStatus, Trade};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub chain_id: i64,
    pub address: String,
    pub name: String,
    pub base_token_address: String,
    pub base_token_decimals: u8,
    pub base_token_symbol: String,
    pub token_address: String,
    pub token_decimals: u8,
    pub token_symbol: String,

    pub init_base_token_amount: Decimal,
    pub init_token_amount: Decimal,
    pub current_base_token_amount: Decimal,
    pub current_token_amount: Decimal,

    pub base_token_price: Decimal,
    pub token_price: Decimal,
    pub liquidity: Decimal,
    pub fdv: Decimal,
    pub mkt_cap: Decimal,

    pub block_num: u64,
    pub block_time: i64,
    pub slot: u64,
    pub latest_trade_time: i64,

    pub pump_point: Decimal,
    pub pump_status: PumpStatus,
    pub pump_virtual_base_token_reserves: Decimal,
    pub pump_virtual_token_reserves: Decimal,
}

impl Pair {
    /// First observation of a pool, seeded from the trade that revealed it.
    pub fn from_trade(trade: &Trade) -> Self {
        let mut pair = Self {
            chain_id: trade.chain_id,
            address: trade.pair_addr.clone(),
            name: trade.swap_name.as_str().to_string(),
            base_token_address: trade.base_token_addr.clone(),
            base_token_decimals: trade.base_token_decimals,
            base_token_symbol: trade.base_token_symbol.clone(),
            token_address: trade.token_addr.clone(),
            token_decimals: trade.token_decimals,
            token_symbol: trade.token_symbol.clone(),
            current_base_token_amount: trade.current_base_token_in_pool_amount,
            current_token_amount: trade.current_token_in_pool_amount,
            base_token_price: trade.base_token_price_usd,
            token_price: trade.token_price_usd,
            block_num: trade.block_num,
            block_time: trade.block_time,
            slot: trade.slot,
            latest_trade_time: trade.block_time,
            ..Default::default()
        };

        if trade.init_base_token_amount > Decimal::ZERO && trade.init_token_amount > Decimal::ZERO {
            pair.init_base_token_amount = trade.init_base_token_amount;
            pair.init_token_amount = trade.init_token_amount;
        }

        if let Some(pump) = &trade.pump {
            pair.pump_point = pump.point;
            pair.pump_status = pump.status;
            pair.pump_virtual_base_token_reserves = pump.virtual_base_reserves;
            pair.pump_virtual_token_reserves = pump.virtual_token_reserves;
        }

        pair
    }
}
