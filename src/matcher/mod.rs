pub mod engine;
pub mod pool;
pub mod ring;
pub mod store;

use crate::db::DbError;
use crate::models::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use engine::{MatchOutcome, Matcher};
pub use pool::MatcherPool;
pub use store::{MemoryOrderStore, OrderStore, RedisOrderStore};

#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("Timed out acquiring lock {0}")]
    LockTimeout(String),

    #[error("Order store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Matcher is shut down")]
    Closed,
}

impl From<redis::RedisError> for MatcherError {
    fn from(err: redis::RedisError) -> Self {
        MatcherError::Store(err.to_string())
    }
}

/// One per-token price update for the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub chain_id: i64,
    pub token_address: String,
    pub side: Side,
    pub price: Decimal,
}
