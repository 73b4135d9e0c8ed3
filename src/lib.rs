pub mod api;
pub mod blockchain;
pub mod cache;
pub mod config;
pub mod constants;
pub mod db;
pub mod decoder;
pub mod emitter;
pub mod error;
pub mod matcher;
pub mod models;
pub mod state;
pub mod validation;

#[cfg(test)]
mod tests;

pub use api::{create_router, ApiError, ApiResponse};
pub use blockchain::{BlockProcessor, ChainClient, SlotTracker, WorkerPool};
pub use config::Config;
pub use error::IndexerError;
pub use matcher::{Matcher, MatcherPool};
pub use validation::{validate_price, validate_side, validate_solana_address};
