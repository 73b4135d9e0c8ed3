use crate::emitter::EmitError;
use crate::models::trade::Trade;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Destination of the trade stream. Messages are keyed by slot.
#[async_trait]
pub trait TradeSink: Send + Sync {
    async fn send(&self, key: String, payload: String) -> Result<(), EmitError>;
}

/// Writes each message to the log at debug level.
pub struct LogSink;

#[async_trait]
impl TradeSink for LogSink {
    async fn send(&self, key: String, payload: String) -> Result<(), EmitError> {
        debug!(key = %key, bytes = payload.len(), "Trade message");
        Ok(())
    }
}

/// Hands messages to an in-process consumer.
pub struct ChannelSink {
    sender: mpsc::Sender<(String, String)>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<(String, String)>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl TradeSink for ChannelSink {
    async fn send(&self, key: String, payload: String) -> Result<(), EmitError> {
        self.sender
            .send((key, payload))
            .await
            .map_err(|_| EmitError::Sink("trade consumer is gone".to_string()))
    }
}

#[derive(Clone)]
pub struct TradePublisher {
    sink: Arc<dyn TradeSink>,
}

impl TradePublisher {
    pub fn new(sink: Arc<dyn TradeSink>) -> Self {
        Self { sink }
    }

    /// Swaps with a usable price; the rest never reach the stream.
    pub fn publishable(trades: &[Trade]) -> Vec<&Trade> {
        trades
            .iter()
            .filter(|trade| trade.trade_type.is_swap() && trade.token_price_usd > Decimal::ZERO)
            .collect()
    }

    /// Publish a block's trades as one JSON array keyed by slot. Returns
    /// how many trades went out.
    pub async fn publish_block(&self, slot: u64, trades: &[Trade]) -> Result<usize, EmitError> {
        let outgoing = Self::publishable(trades);
        if outgoing.is_empty() {
            return Ok(0);
        }

        let payload = serde_json::to_string(&outgoing)?;
        self.sink.send(slot.to_string(), payload).await?;
        Ok(outgoing.len())
    }

    /// Failures are logged only; they never fail the block.
    pub async fn publish_or_warn(&self, slot: u64, trades: &[Trade]) {
        match self.publish_block(slot, trades).await {
            Ok(0) => {}
            Ok(count) => debug!(slot, "Published {} trade(s)", count),
            Err(e) => warn!(slot, "Trade publish failed: {}", e),
        }
    }
}
