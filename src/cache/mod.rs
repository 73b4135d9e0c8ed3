pub mod fee;
pub mod keys;
pub mod mint;
pub mod token;

pub use fee::FeeCacheManager;
pub use keys::CacheKey;
pub use mint::MintCacheManager;
pub use token::TokenCacheManager;

use crate::config::Config;

/// Process-wide caches. Each manager is cheap to clone and shares its store.
#[derive(Clone)]
pub struct AppCache {
    pub mints: MintCacheManager,
    pub fees: FeeCacheManager,
    pub tokens: TokenCacheManager,
}

pub fn init_cache(config: &Config) -> AppCache {
    AppCache {
        mints: MintCacheManager::new(config.cache_max_capacity, config.cache_ttl),
        fees: FeeCacheManager::new(config.cache_max_capacity, config.cache_ttl),
        tokens: TokenCacheManager::new(config.cache_max_capacity, config.cache_ttl),
    }
}
