use crate::blockchain::client::{ChainSource, ClientError};
use crate::blockchain::models::RawBlock;
use crate::blockchain::persist::BlockWriter;
use crate::cache::AppCache;
use crate::config::Config;
use crate::db::block::{get_block, nearest_prior_price, upsert_block};
use crate::decoder::error::DecodeError;
use crate::decoder::snapshot::TokenAccountMap;
use crate::decoder::{decode_block, enrich, oracle};
use crate::emitter::{price_ticks, PriceNotifier, TradePublisher};
use crate::error::IndexerError;
use crate::models::block::{BlockRecord, BlockStatus};
use rust_decimal::Decimal;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Wait before the first fetch so near-head blocks are available.
pub const FETCH_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    /// The slot already reached a terminal status.
    AlreadyDone,
    Skipped,
    /// Recorded as failed; the recovery producer retries it.
    Failed,
    Processed { trades: usize },
}

pub struct BlockProcessor {
    db: Pool<Sqlite>,
    source: Arc<dyn ChainSource>,
    cache: AppCache,
    config: Arc<Config>,
    publisher: TradePublisher,
    notifier: Arc<dyn PriceNotifier>,
    last_price: Mutex<Option<Decimal>>,
    fetch_delay: Duration,
}

impl BlockProcessor {
    pub fn new(
        db: Pool<Sqlite>,
        source: Arc<dyn ChainSource>,
        cache: AppCache,
        config: Arc<Config>,
        publisher: TradePublisher,
        notifier: Arc<dyn PriceNotifier>,
    ) -> Self {
        Self {
            db,
            source,
            cache,
            config,
            publisher,
            notifier,
            last_price: Mutex::new(None),
            fetch_delay: FETCH_DELAY,
        }
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    async fn mark(&self, slot: u64, status: BlockStatus) {
        if let Err(e) = upsert_block(&self.db, &BlockRecord::new(slot, status)).await {
            error!(slot, "Failed to record status {:?}: {}", status, e);
        }
    }

    /// SOL price for a block: the block's own stable swaps, else the last
    /// price seen, else the nearest persisted price, else configuration.
    async fn base_price(&self, slot: u64, observed: Option<Decimal>) -> Decimal {
        let mut last = self.last_price.lock().await;
        if let Some(price) = observed {
            *last = Some(price);
            return price;
        }
        if let Some(price) = *last {
            return price;
        }
        drop(last);

        let nearest = nearest_prior_price(&self.db, slot).await;
        if let Err(e) = &nearest {
            warn!(slot, "Nearest block price lookup failed: {}", e);
        }
        oracle::fallback_price(nearest, &self.config)
    }

    /// Fetch, decode, persist and emit one slot. Any error after the fetch
    /// leaves the block `failed`.
    pub async fn process_slot(&self, slot: u64) -> Result<SlotOutcome, IndexerError> {
        if let Some(block) = get_block(&self.db, slot).await? {
            if block.status.is_terminal() {
                debug!(slot, "Slot already {:?}", block.status);
                return Ok(SlotOutcome::AlreadyDone);
            }
        }
        self.mark(slot, BlockStatus::Processing).await;

        tokio::time::sleep(self.fetch_delay).await;

        let block = match self.source.fetch_block(slot).await {
            Ok(block) => block,
            Err(ClientError::Skipped(_)) => {
                debug!(slot, "Slot skipped");
                self.mark(slot, BlockStatus::Skipped).await;
                return Ok(SlotOutcome::Skipped);
            }
            Err(e) => {
                warn!(slot, "Block fetch failed: {}", e);
                self.mark(slot, BlockStatus::Failed).await;
                return Ok(SlotOutcome::Failed);
            }
        };

        match self.index_block(block).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(slot, "Block processing failed: {}", e);
                self.mark(slot, BlockStatus::Failed).await;
                Err(e)
            }
        }
    }

    async fn index_block(&self, block: RawBlock) -> Result<SlotOutcome, IndexerError> {
        let slot = block.slot;
        let decode_inner = self.config.decode_inner_instructions;

        let observed = oracle::block_base_price(&block, &mut TokenAccountMap::new());
        let sol_price = self.base_price(slot, observed).await;

        // Decoding is CPU bound and any panic in it stays inside the task
        let (block, decoded) = tokio::task::spawn_blocking(move || {
            let decoded = decode_block(&block, sol_price, decode_inner);
            (block, decoded)
        })
        .await
        .map_err(|e| DecodeError::invalid(format!("decoder aborted on slot {}: {}", slot, e)))?;

        let trades = enrich::resolve_pending_decimals(decoded.trades, self.source.as_ref(), &self.cache.mints, sol_price).await;

        let writer = BlockWriter { db: &self.db, source: self.source.as_ref(), cache: &self.cache };
        let summary = writer.write(&trades, &decoded.accounts, self.config.chain_id, slot).await?;

        self.publisher.publish_or_warn(slot, &trades).await;
        self.notifier.notify_all(price_ticks(&trades)).await;

        upsert_block(
            &self.db,
            &BlockRecord {
                slot,
                block_height: block.block_height,
                block_time: block.block_time,
                status: BlockStatus::Processed,
                sol_price,
            },
        )
        .await?;

        info!(
            slot,
            trades = summary.trades,
            pairs = summary.pairs,
            holders = summary.holders,
            pools = summary.pools,
            "Processed block at SOL price {}",
            sol_price
        );
        Ok(SlotOutcome::Processed { trades: trades.len() })
    }
}
