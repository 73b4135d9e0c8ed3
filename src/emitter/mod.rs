//! Downstream signals produced after a block is persisted: the trade stream
//! and per-token price updates for the limit-order matcher.

pub mod notifier;
pub mod publisher;

use crate::matcher::MatcherError;
use thiserror::Error;

pub use notifier::{price_ticks, HttpNotifier, MatcherNotifier, PriceNotifier};
pub use publisher::{ChannelSink, LogSink, TradePublisher, TradeSink};

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Matcher rejected update: {0}")]
    Matcher(#[from] MatcherError),

    #[error("Sink error: {0}")]
    Sink(String),
}
