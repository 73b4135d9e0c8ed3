//! Block-level passes over decoded trades: block fields, sandwich markers
//! and the deferred decimals lookup.

use crate::blockchain::client::ChainSource;
use crate::blockchain::models::RawBlock;
use crate::cache::MintCacheManager;
use crate::constants::PUMP_TOKEN_RESERVES_DIFF;
use crate::decoder::pump::curve_progress;
use crate::decoder::settle_prices;
use crate::models::amount::raw_to_decimal;
use crate::models::trade::{SwapName, Trade, TradeType};
use crate::validation::parse_pubkey;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

const BUY_BIT: u8 = 1 << 0;
const SELL_BIT: u8 = 1 << 1;

pub fn fill_block_fields(trades: &mut [Trade], block: &RawBlock) {
    let block_time = block.block_time.unwrap_or(0);
    let now = Utc::now().timestamp();

    for trade in trades.iter_mut() {
        trade.slot = block.slot;
        trade.block_num = block.slot;
        trade.block_time = block_time;
        trade.hash_id = Trade::make_hash_id(block.slot, trade.tx_index);
        trade.create_time = now;
    }
}

/// Flag every trade of a maker who both bought and sold the same pair
/// within the block.
pub fn mark_sandwiches(trades: &mut [Trade]) {
    let mut sides: HashMap<(&str, &str), u8> = HashMap::new();
    for trade in trades.iter() {
        let bit = match trade.trade_type {
            TradeType::Buy => BUY_BIT,
            TradeType::Sell => SELL_BIT,
            _ => continue,
        };
        *sides.entry((trade.pair_addr.as_str(), trade.maker.as_str())).or_default() |= bit;
    }

    let sandwiched: HashSet<(String, String)> = sides
        .into_iter()
        .filter(|(_, mask)| *mask == BUY_BIT | SELL_BIT)
        .map(|((pair, maker), _)| (pair.to_string(), maker.to_string()))
        .collect();

    for trade in trades.iter_mut() {
        trade.clamp = sandwiched.contains(&(trade.pair_addr.clone(), trade.maker.clone()));
    }
}

/// Recompute everything that depends on the token's decimals.
fn apply_decimals(trade: &mut Trade, decimals: u8, sol_price: Decimal) {
    trade.token_decimals = decimals;
    trade.decimals_pending = false;
    trade.rescale();

    if let Some(pump) = trade.pump.as_mut() {
        if trade.trade_type.is_swap() {
            let (point, status) = curve_progress(trade.current_token_in_pool_amount);
            pump.point = point;
            pump.status = status;
        }
        if trade.swap_name == SwapName::PumpFun {
            let virtual_tokens = trade.raw.token_reserve.saturating_add(PUMP_TOKEN_RESERVES_DIFF);
            pump.virtual_token_reserves = raw_to_decimal(virtual_tokens, decimals);
        }
    }

    settle_prices(trade, sol_price);
}

/// Resolve decimals the transaction did not carry by reading the mint
/// accounts, once per mint. Trades whose mint cannot be read are dropped.
pub async fn resolve_pending_decimals(
    trades: Vec<Trade>,
    source: &dyn ChainSource,
    mints: &MintCacheManager,
    sol_price: Decimal,
) -> Vec<Trade> {
    let pending: HashSet<String> = trades
        .iter()
        .filter(|trade| trade.decimals_pending)
        .map(|trade| trade.token_addr.clone())
        .collect();

    if pending.is_empty() {
        return trades;
    }

    let mut resolved: HashMap<String, u8> = HashMap::new();
    for address in pending {
        let mint = match parse_pubkey(&address) {
            Ok(mint) => mint,
            Err(e) => {
                warn!(mint = %address, "Cannot resolve decimals: {}", e);
                continue;
            }
        };
        match mints.get_or_fetch(source, &mint).await {
            Ok(info) => {
                resolved.insert(address, info.decimals);
            }
            Err(e) => warn!(mint = %address, "Failed to read mint decimals: {}", e),
        }
    }
    debug!("Resolved decimals for {} mint(s)", resolved.len());

    trades
        .into_iter()
        .filter_map(|mut trade| {
            if !trade.decimals_pending {
                return Some(trade);
            }
            match resolved.get(&trade.token_addr) {
                Some(decimals) => {
                    apply_decimals(&mut trade, *decimals, sol_price);
                    Some(trade)
                }
                None => {
                    warn!(tx_hash = %trade.tx_hash, pair = %trade.pair_addr, "Dropping trade with unknown decimals");
                    None
                }
            }
        })
        .collect()
}
