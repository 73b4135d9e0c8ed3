//! Token creation-time cache

use super::keys::CacheKey;
use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

/// Manages caching of token `created_at` values, which pick the weekly
/// holder shard of every token account of that mint
#[derive(Clone)]
pub struct TokenCacheManager {
    cache: Cache<CacheKey, i64>,
}

impl TokenCacheManager {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn created_at(&self, token: &str) -> Option<i64> {
        self.cache.get(&CacheKey::token_created_at(token)).await
    }

    pub async fn set_created_at(&self, token: &str, created_at: i64) {
        self.cache.insert(CacheKey::token_created_at(token), created_at).await;
        debug!("Cached token created_at: {} = {}", token, created_at);
    }

    pub async fn invalidate(&self, token: &str) {
        self.cache.invalidate(&CacheKey::token_created_at(token)).await;
    }
}
