//! Mint decimals and supply cache

use super::keys::CacheKey;
use crate::blockchain::client::{ChainSource, ClientError, MintInfo};
use moka::future::Cache;
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use tracing::debug;

/// Manages caching of mint account lookups
#[derive(Clone)]
pub struct MintCacheManager {
    cache: Cache<CacheKey, MintInfo>,
}

impl MintCacheManager {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, mint: &Pubkey) -> Option<MintInfo> {
        self.cache.get(&CacheKey::mint(&mint.to_string())).await
    }

    pub async fn insert(&self, mint: &Pubkey, info: MintInfo) {
        self.cache.insert(CacheKey::mint(&mint.to_string()), info).await;
        debug!("Cached mint {}: decimals = {}", mint, info.decimals);
    }

    /// Cached mint info, read from chain on a miss
    pub async fn get_or_fetch(&self, source: &dyn ChainSource, mint: &Pubkey) -> Result<MintInfo, ClientError> {
        if let Some(info) = self.get(mint).await {
            return Ok(info);
        }

        let info = source.get_mint_info(mint).await?;
        self.insert(mint, info).await;
        Ok(info)
    }
}
