//! Cache key generation and management

use std::fmt;

/// A structured cache key that can be converted to a string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Decimals and supply of a mint
    Mint(String),
    /// Trade fee rate of an AMM config account
    AmmFee(String),
    /// First-seen time of a token row
    TokenCreatedAt(String),
}

impl CacheKey {
    pub fn mint(address: &str) -> Self {
        Self::Mint(address.to_string())
    }

    pub fn amm_fee(config: &str) -> Self {
        Self::AmmFee(config.to_string())
    }

    pub fn token_created_at(address: &str) -> Self {
        Self::TokenCreatedAt(address.to_string())
    }

    /// The address the key refers to
    pub fn address(&self) -> &str {
        match self {
            Self::Mint(address) | Self::AmmFee(address) | Self::TokenCreatedAt(address) => address,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mint(address) => write!(f, "mint:{}", address),
            Self::AmmFee(address) => write!(f, "amm_fee:{}", address),
            Self::TokenCreatedAt(address) => write!(f, "token_created:{}", address),
        }
    }
}
