//! AMM config fee-rate cache

use super::keys::CacheKey;
use crate::blockchain::client::{ChainSource, ClientError};
use crate::decoder::amm_config::{self, AmmKind};
use moka::future::Cache;
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use tracing::debug;

/// Manages caching of trade fee rates read from AMM config accounts
#[derive(Clone)]
pub struct FeeCacheManager {
    cache: Cache<CacheKey, u64>,
}

impl FeeCacheManager {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, config: &str) -> Option<u64> {
        self.cache.get(&CacheKey::amm_fee(config)).await
    }

    pub async fn insert(&self, config: &str, fee_rate: u64) {
        self.cache.insert(CacheKey::amm_fee(config), fee_rate).await;
        debug!("Cached fee rate: {} = {}", config, fee_rate);
    }

    /// Trade fee rate of an AMM config, fetched and decoded on a miss
    pub async fn trade_fee_rate(
        &self,
        source: &dyn ChainSource,
        config: &Pubkey,
        kind: AmmKind,
    ) -> Result<u64, ClientError> {
        let key = config.to_string();
        if let Some(rate) = self.get(&key).await {
            return Ok(rate);
        }

        let data = source.get_account_data(config).await?;
        let rate = amm_config::trade_fee_rate(kind, &data)
            .ok_or_else(|| ClientError::InvalidData(format!("amm config {}", config)))?;
        self.insert(&key, rate).await;
        Ok(rate)
    }
}
