//! Write a decoded block: trades, pairs and tokens, holder balances, pool
//! metadata and supply changes.

use crate::blockchain::client::ChainSource;
use crate::cache::AppCache;
use crate::db::pool::{insert_pool, pool_exists, pool_key, touch_pool};
use crate::db::token::{ensure_token, get_token, update_total_supply, TokenRecord};
use crate::db::token_account::upsert_holders;
use crate::db::trade::insert_trades;
use crate::db::{pair, DbError};
use crate::decoder::amm_config::AmmKind;
use crate::decoder::snapshot::TokenAccountMap;
use crate::models::amount::raw_to_decimal;
use crate::models::pool::PoolInfo;
use crate::models::token_account::{HolderStatus, TokenHolderBalance};
use crate::models::trade::{SwapName, Trade, TradeType};
use crate::validation::parse_pubkey;
use rust_decimal::Decimal;
use sqlx::{Pool, Sqlite};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Counts of what one block wrote.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistSummary {
    pub trades: u64,
    pub pairs: usize,
    pub holders: u64,
    pub pools: usize,
    pub supplies: usize,
}

/// Trades that reach the trade shards and pairs: priced swaps, CLMM pool
/// creations and CLMM position openings.
pub fn is_persistable(trade: &Trade) -> bool {
    match trade.trade_type {
        TradeType::Buy | TradeType::Sell => trade.token_price_usd > Decimal::ZERO,
        TradeType::Create | TradeType::OpenPosition => trade.swap_name == SwapName::RaydiumClmm,
        _ => false,
    }
}

/// Holder rows for every owned token account seen in the block.
pub fn holder_rows(accounts: &TokenAccountMap, chain_id: i64, slot: u64) -> Vec<TokenHolderBalance> {
    accounts
        .values()
        .filter_map(|account| {
            let owner = account.owner?;
            Some(TokenHolderBalance {
                chain_id,
                token_address: account.mint.to_string(),
                owner: owner.to_string(),
                token_account_address: account.address.to_string(),
                balance: account.post,
                decimals: account.decimals,
                slot,
                status: if account.closed { HolderStatus::Closed } else { HolderStatus::Open },
                created_at: 0,
            })
        })
        .collect()
}

pub struct BlockWriter<'a> {
    pub db: &'a Pool<Sqlite>,
    pub source: &'a dyn ChainSource,
    pub cache: &'a AppCache,
}

impl BlockWriter<'_> {
    /// Total supply of a token in token units, creating its row on first
    /// sight. Supply reads that fail leave the supply unknown (zero).
    async fn token_supply(&self, trade: &Trade) -> Result<Decimal, DbError> {
        if let Some(token) = get_token(self.db, &trade.token_addr).await? {
            if self.cache.tokens.created_at(&token.address).await.is_none() {
                self.cache.tokens.set_created_at(&token.address, token.created_at).await;
            }
            return Ok(token.total_supply);
        }

        let total_supply = match parse_pubkey(&trade.token_addr) {
            Ok(mint) => match self.source.get_total_supply(&mint).await {
                Ok(raw) => raw_to_decimal(raw, trade.token_decimals),
                Err(e) => {
                    warn!(token = %trade.token_addr, "Total supply unavailable: {}", e);
                    Decimal::ZERO
                }
            },
            Err(_) => Decimal::ZERO,
        };

        let stored = ensure_token(
            self.db,
            &TokenRecord {
                address: trade.token_addr.clone(),
                chain_id: trade.chain_id,
                decimals: trade.token_decimals,
                total_supply,
                created_at: trade.block_time,
            },
        )
        .await?;
        self.cache.tokens.set_created_at(&stored.address, stored.created_at).await;
        Ok(stored.total_supply)
    }

    /// One pair update per pair, from its last trade in the block.
    async fn save_pairs(&self, trades: &[&Trade]) -> Result<usize, DbError> {
        let mut last: HashMap<&str, &Trade> = HashMap::new();
        for trade in trades.iter().filter(|t| !t.pair_addr.is_empty()) {
            last.insert(trade.pair_addr.as_str(), trade);
        }

        for trade in last.values() {
            let total_supply = self.token_supply(trade).await?;
            pair::save_pair(self.db, trade, total_supply).await?;
        }
        Ok(last.len())
    }

    async fn write_trades_and_holders(
        &self,
        trades: &[Trade],
        accounts: &TokenAccountMap,
        chain_id: i64,
        slot: u64,
    ) -> Result<(u64, usize, u64), DbError> {
        let persistable: Vec<&Trade> = trades.iter().filter(|t| is_persistable(t)).collect();

        let pairs = self.save_pairs(&persistable).await?;
        let owned: Vec<Trade> = persistable.into_iter().cloned().collect();
        let inserted = insert_trades(self.db, &owned).await?;

        // Token rows exist now, so the holder shards can resolve created_at
        let holders = upsert_holders(self.db, holder_rows(accounts, chain_id, slot)).await?;
        Ok((inserted, pairs, holders))
    }

    async fn fee_rate(&self, info: &PoolInfo) -> u64 {
        let (config, kind) = match info {
            PoolInfo::Cpmm(pool) => (pool.amm_config.as_str(), AmmKind::Cpmm),
            PoolInfo::Clmm(pool) if pool.trade_fee_rate != 0 => return pool.trade_fee_rate as u64,
            PoolInfo::Clmm(pool) => (pool.amm_config.as_str(), AmmKind::Clmm),
            _ => return 0,
        };

        let Ok(config) = parse_pubkey(config) else {
            return 0;
        };
        match self.cache.fees.trade_fee_rate(self.source, &config, kind).await {
            Ok(rate) => rate,
            Err(e) => {
                warn!(amm_config = %config, "Fee rate unavailable: {}", e);
                0
            }
        }
    }

    async fn write_pools(&self, trades: &[Trade]) -> Result<usize, DbError> {
        let mut seen = HashSet::new();
        let mut written = 0;

        for info in trades.iter().filter_map(|t| t.pool.as_ref()) {
            let (table, _, key) = pool_key(info);
            if !seen.insert((table, key.to_string())) {
                continue;
            }

            if pool_exists(self.db, info).await? {
                touch_pool(self.db, info).await?;
            } else {
                let fee_rate = self.fee_rate(info).await;
                if insert_pool(self.db, info, fee_rate).await? {
                    debug!(pool = %key, table, "Inserted pool");
                }
            }
            written += 1;
        }
        Ok(written)
    }

    async fn write_supplies(&self, trades: &[Trade]) -> Result<usize, DbError> {
        let mut seen = HashSet::new();
        let mut updated = 0;

        for trade in trades.iter().filter(|t| t.trade_type.is_token_event()) {
            let Some(change) = &trade.supply_change else {
                continue;
            };
            if !seen.insert(change.mint.as_str()) {
                continue;
            }
            let Ok(mint) = parse_pubkey(&change.mint) else {
                continue;
            };

            match self.source.get_total_supply(&mint).await {
                Ok(raw) if raw > 0 => {
                    let supply = raw_to_decimal(raw, trade.token_decimals);
                    if update_total_supply(self.db, &change.mint, supply).await? {
                        updated += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(mint = %change.mint, "Supply refresh failed: {}", e),
            }
        }
        Ok(updated)
    }

    /// Write every group concurrently and join before the block is marked.
    pub async fn write(
        &self,
        trades: &[Trade],
        accounts: &TokenAccountMap,
        chain_id: i64,
        slot: u64,
    ) -> Result<PersistSummary, DbError> {
        let (main, pools, supplies) = tokio::join!(
            self.write_trades_and_holders(trades, accounts, chain_id, slot),
            self.write_pools(trades),
            self.write_supplies(trades),
        );

        let (trades, pairs, holders) = main?;
        Ok(PersistSummary { trades, pairs, holders, pools: pools?, supplies: supplies? })
    }
}
