// Service configuration, read from the environment:
// - RPC endpoint ring and WebSocket URL
// - Database connection string
// - Matcher server address/port and Redis
// - Block workers, slot queue and matcher pool sizing
// - Cache settings (size, TTL)
// - Fallback SOL prices

use dotenv::dotenv;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::SOL_CHAIN_ID;

#[derive(Debug, Clone)]
pub struct Config {
    pub chain_id: i64,
    pub solana_rpc_urls: Vec<String>,
    pub solana_ws_url: String,
    pub start_slot: u64,
    pub concurrency: usize,
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub rpc_timeout_secs: u64,
    pub rpc_rate_limit: Option<u32>,
    pub rpc_max_retries: usize,
    pub cache_ttl: Duration,
    pub cache_max_capacity: u64,
    pub fallback_sol_price: Decimal,
    pub fallback_sol_price_secondary: Decimal,
    pub redis_url: Option<String>,
    pub trade_rpc_endpoint: Option<String>,
    pub slot_queue_capacity: usize,
    pub matcher_workers: usize,
    pub matcher_ring_size: usize,
    pub decode_inner_instructions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain_id: SOL_CHAIN_ID,
            solana_rpc_urls: vec!["https://api.mainnet-beta.solana.com".to_string()],
            solana_ws_url: "wss://api.mainnet-beta.solana.com".to_string(),
            start_slot: 0,
            concurrency: num_cpus::get(),
            database_url: "sqlite:data.db".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            rpc_timeout_secs: 8,
            rpc_rate_limit: None,
            rpc_max_retries: 10,
            cache_ttl: Duration::from_secs(60),
            cache_max_capacity: 10_000,
            fallback_sol_price: Decimal::new(2386, 1),
            fallback_sol_price_secondary: Decimal::new(2375, 1),
            redis_url: None,
            trade_rpc_endpoint: None,
            slot_queue_capacity: 50,
            matcher_workers: 16,
            matcher_ring_size: 1024,
            decode_inner_instructions: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let defaults = Config::default();

        let chain_id = env::var("CHAIN_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.chain_id);
        let solana_rpc_urls = env::var("SOLANA_RPC_URLS")
            .map(|v| {
                v.split(',')
                    .map(|url| url.trim().to_string())
                    .filter(|url| !url.is_empty())
                    .collect::<Vec<_>>()
            })
            .ok()
            .filter(|urls| !urls.is_empty())
            .unwrap_or(defaults.solana_rpc_urls);
        let solana_ws_url = env::var("SOLANA_WS_URL").unwrap_or(defaults.solana_ws_url);
        let start_slot = env::var("START_SLOT")
            .map(|v| v.parse().unwrap_or(0))
            .unwrap_or(defaults.start_slot);
        let concurrency = env::var("CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.concurrency);
        let database_url = env::var("DATABASE_URL").unwrap_or(defaults.database_url);
        let server_host = env::var("SERVER_HOST").unwrap_or(defaults.server_host);
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(defaults.server_port);
        // Calls are capped between 5 and 10 seconds
        let rpc_timeout_secs = env::var("RPC_TIMEOUT_SECS")
            .map(|v| v.parse().unwrap_or(8))
            .unwrap_or(defaults.rpc_timeout_secs)
            .clamp(5, 10);
        let rpc_rate_limit = env::var("RPC_RATE_LIMIT")
            .map(|v| v.parse().ok())
            .unwrap_or(None);
        let rpc_max_retries = env::var("RPC_MAX_RETRIES")
            .map(|v| v.parse().unwrap_or(10))
            .unwrap_or(defaults.rpc_max_retries);
        let cache_ttl = env::var("CACHE_TTL")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache_ttl);
        let cache_max_capacity = env::var("CACHE_MAX_CAPACITY")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .unwrap_or(defaults.cache_max_capacity);
        let fallback_sol_price = env::var("FALLBACK_SOL_PRICE")
            .ok()
            .and_then(|v| Decimal::from_str(v.trim()).ok())
            .unwrap_or(defaults.fallback_sol_price);
        let fallback_sol_price_secondary = env::var("FALLBACK_SOL_PRICE_SECONDARY")
            .ok()
            .and_then(|v| Decimal::from_str(v.trim()).ok())
            .unwrap_or(defaults.fallback_sol_price_secondary);
        let redis_url = env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty());
        let trade_rpc_endpoint = env::var("TRADE_RPC_ENDPOINT").ok().filter(|v| !v.trim().is_empty());
        let slot_queue_capacity = env::var("SLOT_QUEUE_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.slot_queue_capacity);
        let matcher_workers = env::var("MATCHER_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.matcher_workers);
        let matcher_ring_size = env::var("MATCHER_RING_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|n| n.max(2).next_power_of_two())
            .unwrap_or(defaults.matcher_ring_size);
        let decode_inner_instructions = env::var("DECODE_INNER_INSTRUCTIONS")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.decode_inner_instructions);

        Self {
            chain_id,
            solana_rpc_urls,
            solana_ws_url,
            start_slot,
            concurrency,
            database_url,
            server_host,
            server_port,
            rpc_timeout_secs,
            rpc_rate_limit,
            rpc_max_retries,
            cache_ttl,
            cache_max_capacity,
            fallback_sol_price,
            fallback_sol_price_secondary,
            redis_url,
            trade_rpc_endpoint,
            slot_queue_capacity,
            matcher_workers,
            matcher_ring_size,
            decode_inner_instructions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_carry_fallback_prices() {
        let config = Config::default();
        assert_eq!(config.fallback_sol_price, dec!(238.6));
        assert_eq!(config.fallback_sol_price_secondary, dec!(237.5));
        assert_eq!(config.slot_queue_capacity, 50);
        assert!(config.matcher_ring_size.is_power_of_two());
        assert!(!config.decode_inner_instructions);
    }
}
