//! Slot pipeline end to end: chain source, decoder, persistence, trade
//! stream and the limit-order matcher, over an in-memory database.

#[cfg(test)]
mod tests {
    use crate::{
        blockchain::{
            client::{ChainSource, ClientError, MintInfo},
            models::{fixtures::key, RawBlock, RawTransaction},
            processor::{BlockProcessor, SlotOutcome},
            slot_tracker::emit_historical,
            worker_pool::WorkerPool,
        },
        cache::{self, AppCache},
        config::Config,
        db::{
            block::{find_retry_slots, get_block},
            connection::establish_memory_connection,
            order::{get_order, insert_order},
            trade::{count_trades, shard_name},
        },
        decoder::{cpmm, pump},
        emitter::{ChannelSink, MatcherNotifier, TradePublisher},
        matcher::{store::register_limit, Matcher, MatcherPool, MemoryOrderStore, OrderStore},
        models::{
            block::BlockStatus,
            order::{LimitOrder, OrderStatus, PriceLimitItem, Side, TriggerKind},
        },
    };
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use solana_sdk::pubkey::Pubkey;
    use sqlx::SqlitePool;
    use std::{collections::HashMap, sync::Arc, sync::Mutex, time::Duration};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    const BLOCK_TIME: i64 = 1_704_067_200;

    #[derive(Clone)]
    enum MockSlot {
        Block(Vec<RawTransaction>),
        Down,
    }

    /// Chain with hand-built blocks. Unknown slots are skipped.
    #[derive(Default)]
    struct MockChain {
        slots: Mutex<HashMap<u64, MockSlot>>,
    }

    impl MockChain {
        fn set(&self, slot: u64, state: MockSlot) {
            self.slots.lock().unwrap().insert(slot, state);
        }
    }

    #[async_trait]
    impl ChainSource for MockChain {
        async fn get_account_data(&self, address: &Pubkey) -> Result<Vec<u8>, ClientError> {
            Err(ClientError::NotFound(address.to_string()))
        }

        async fn get_mint_info(&self, _mint: &Pubkey) -> Result<MintInfo, ClientError> {
            Ok(MintInfo { decimals: 6, supply: 1_000_000_000_000_000 })
        }

        async fn get_total_supply(&self, _mint: &Pubkey) -> Result<u64, ClientError> {
            Ok(1_000_000_000_000_000)
        }

        async fn fetch_block(&self, slot: u64) -> Result<RawBlock, ClientError> {
            let state = self.slots.lock().unwrap().get(&slot).cloned();
            match state {
                Some(MockSlot::Block(transactions)) => Ok(RawBlock {
                    slot,
                    block_time: Some(BLOCK_TIME),
                    block_height: Some(slot - 10),
                    transactions,
                }),
                Some(MockSlot::Down) => Err(ClientError::Transient("connection reset".to_string())),
                None => Err(ClientError::Skipped(slot)),
            }
        }
    }

    struct Harness {
        db: SqlitePool,
        chain: Arc<MockChain>,
        processor: Arc<BlockProcessor>,
        stream: mpsc::Receiver<(String, String)>,
        matcher: Arc<MatcherPool>,
        store: Arc<MemoryOrderStore>,
    }

    async fn setup() -> Harness {
        let config = Config::default();
        let db = establish_memory_connection().await.unwrap();
        let cache: AppCache = cache::init_cache(&config);
        let chain = Arc::new(MockChain::default());

        let store = Arc::new(MemoryOrderStore::new());
        let matcher = Arc::new(MatcherPool::start(Arc::new(Matcher::new(store.clone(), db.clone())), 2, 64));

        let (sink, stream) = ChannelSink::new(16);
        let processor = BlockProcessor::new(
            db.clone(),
            chain.clone(),
            cache,
            Arc::new(config),
            TradePublisher::new(Arc::new(sink)),
            Arc::new(MatcherNotifier::new(matcher.clone())),
        )
        .with_fetch_delay(Duration::ZERO);

        Harness { db, chain, processor: Arc::new(processor), stream, matcher, store }
    }

    #[tokio::test]
    async fn test_block_is_indexed_once() {
        let mut h = setup().await;
        h.chain.set(500, MockSlot::Block(vec![pump::tests::two_buys_tx(key(1))]));

        let outcome = h.processor.process_slot(500).await.unwrap();
        assert_eq!(outcome, SlotOutcome::Processed { trades: 2 });

        let block = get_block(&h.db, 500).await.unwrap().unwrap();
        assert_eq!(block.status, BlockStatus::Processed);
        assert_eq!(block.block_height, Some(490));
        assert_eq!(block.sol_price, dec!(238.6));
        assert_eq!(count_trades(&h.db, &shard_name(BLOCK_TIME)).await.unwrap(), 2);

        let (key, payload) = h.stream.recv().await.unwrap();
        assert_eq!(key, "500");
        let published: Vec<serde_json::Value> = serde_json::from_str(&payload).unwrap();
        assert_eq!(published.len(), 2);

        // Reprocessing a finished slot writes and emits nothing
        assert_eq!(h.processor.process_slot(500).await.unwrap(), SlotOutcome::AlreadyDone);
        assert_eq!(count_trades(&h.db, &shard_name(BLOCK_TIME)).await.unwrap(), 2);
        assert!(h.stream.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_skipped_and_failed_slots() {
        let h = setup().await;
        h.chain.set(502, MockSlot::Down);

        assert_eq!(h.processor.process_slot(501).await.unwrap(), SlotOutcome::Skipped);
        assert_eq!(h.processor.process_slot(502).await.unwrap(), SlotOutcome::Failed);
        assert_eq!(get_block(&h.db, 501).await.unwrap().unwrap().status, BlockStatus::Skipped);
        assert_eq!(get_block(&h.db, 502).await.unwrap().unwrap().status, BlockStatus::Failed);
        assert_eq!(find_retry_slots(&h.db, 1_000, 10).await.unwrap(), vec![502]);

        // The retry succeeds once the node serves the block
        h.chain.set(502, MockSlot::Block(vec![cpmm::tests::sell_tx(key(1), 4_000_000, 2_000_000_000)]));
        assert_eq!(h.processor.process_slot(502).await.unwrap(), SlotOutcome::Processed { trades: 1 });
        assert!(find_retry_slots(&h.db, 1_000, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_block_price_fires_limit_order() {
        let h = setup().await;
        let token = key(pump::tests::MINT).to_string();

        let order = LimitOrder {
            id: 0,
            token_address: token.clone(),
            chain_id: 100000,
            side: Side::Buy,
            base_price: dec!(0.000001),
            trigger_kind: TriggerKind::Price,
            trailing_percent: dec!(0),
            status: OrderStatus::Waiting,
            created_at: 0,
        };
        let id = insert_order(&h.db, &order).await.unwrap();
        let store: &dyn OrderStore = h.store.as_ref();
        register_limit(store, &token, Side::Buy, &PriceLimitItem { order_id: id, base_price: order.base_price })
            .await
            .unwrap();

        h.chain.set(600, MockSlot::Block(vec![pump::tests::two_buys_tx(key(1))]));
        h.processor.process_slot(600).await.unwrap();
        assert!(h.matcher.release(Duration::from_secs(5)).await);

        let fired = get_order(&h.db, id).await.unwrap().unwrap();
        assert_eq!(fired.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_workers_drain_a_backfill() {
        let h = setup().await;
        h.chain.set(700, MockSlot::Block(vec![pump::tests::two_buys_tx(key(1))]));
        h.chain.set(702, MockSlot::Down);

        let (queue, receiver) = mpsc::channel(4);
        let workers = WorkerPool::start(h.processor.clone(), receiver, 3);
        assert_eq!(workers.len(), 3);

        let cancel = CancellationToken::new();
        assert_eq!(emit_historical(&queue, 700, 703, Duration::ZERO, &cancel).await, 4);
        drop(queue);
        assert!(workers.join(Duration::from_secs(5)).await);

        let status = |slot| {
            let db = h.db.clone();
            async move { get_block(&db, slot).await.unwrap().unwrap().status }
        };
        assert_eq!(status(700).await, BlockStatus::Processed);
        assert_eq!(status(701).await, BlockStatus::Skipped);
        assert_eq!(status(702).await, BlockStatus::Failed);
        assert_eq!(status(703).await, BlockStatus::Skipped);
    }
}
