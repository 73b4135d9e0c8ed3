use crate::db::order::try_mark_processing;
use crate::matcher::store::{self, lock_key, trailing_key, with_lock, OrderStore, LOCK_TIMEOUT};
use crate::matcher::{MatcherError, PriceTick};
use crate::models::order::{PriceLimitItem, Side, TrailingItem};
use rust_decimal::Decimal;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Split price orders into crossed and resting ones, keeping list order.
/// Buy triggers sit at or above the incoming price, sell triggers at or
/// below it.
pub fn select_crossed(items: Vec<PriceLimitItem>, side: Side, price: Decimal) -> (Vec<PriceLimitItem>, Vec<PriceLimitItem>) {
    items.into_iter().partition(|item| match side {
        Side::Buy => item.base_price >= price,
        Side::Sell => item.base_price <= price,
    })
}

pub fn drawdown_price(price: Decimal, trailing_percent: Decimal) -> Decimal {
    price * (Decimal::ONE_HUNDRED - trailing_percent) / Decimal::ONE_HUNDRED
}

/// Trailing stops at or above their drawdown price fire. The rest follow a
/// rising price upwards and are returned ordered by trailing percent.
pub fn apply_trailing(items: Vec<TrailingItem>, price: Decimal) -> (Vec<TrailingItem>, Vec<TrailingItem>) {
    let (triggered, mut resting): (Vec<_>, Vec<_>) = items.into_iter().partition(|item| item.drawdown_price >= price);

    for item in resting.iter_mut() {
        if price > item.base_price {
            item.base_price = price;
            item.drawdown_price = drawdown_price(price, item.trailing_percent);
        }
    }
    resting.sort_by(|a, b| a.trailing_percent.cmp(&b.trailing_percent));

    (triggered, resting)
}

/// Orders that moved to `processing` on one tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MatchOutcome {
    pub fired: Vec<i64>,
    pub remaining: usize,
}

pub struct Matcher {
    store: Arc<dyn OrderStore>,
    db: Pool<Sqlite>,
}

impl Matcher {
    pub fn new(store: Arc<dyn OrderStore>, db: Pool<Sqlite>) -> Self {
        Self { store, db }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Orders whose conditional `waiting -> processing` update took effect.
    async fn fire(&self, ids: impl Iterator<Item = i64>) -> Result<Vec<i64>, MatcherError> {
        let mut fired = Vec::new();
        for id in ids {
            if try_mark_processing(&self.db, id).await? > 0 {
                info!(order_id = id, "Limit order triggered");
                fired.push(id);
            } else {
                debug!(order_id = id, "Order already left the waiting state");
            }
        }
        Ok(fired)
    }

    async fn match_limits(&self, tick: &PriceTick) -> Result<MatchOutcome, MatcherError> {
        let key = lock_key(&tick.token_address, tick.side);
        with_lock(self.store.as_ref(), &key, LOCK_TIMEOUT, || async {
            let items = store::load_limits(self.store.as_ref(), &tick.token_address, tick.side).await?;
            if items.is_empty() {
                return Ok(MatchOutcome::default());
            }

            let (crossed, resting) = select_crossed(items, tick.side, tick.price);
            if crossed.is_empty() {
                return Ok(MatchOutcome { fired: Vec::new(), remaining: resting.len() });
            }

            let fired = self.fire(crossed.iter().map(|item| item.order_id)).await?;
            store::save_limits(self.store.as_ref(), &tick.token_address, tick.side, &resting).await?;
            Ok(MatchOutcome { fired, remaining: resting.len() })
        })
        .await
    }

    async fn match_trailing(&self, tick: &PriceTick) -> Result<MatchOutcome, MatcherError> {
        let key = format!("{}:lock", trailing_key(&tick.token_address, tick.chain_id));
        with_lock(self.store.as_ref(), &key, LOCK_TIMEOUT, || async {
            let items = store::load_trailing(self.store.as_ref(), &tick.token_address, tick.chain_id).await?;
            if items.is_empty() {
                return Ok(MatchOutcome::default());
            }

            let (triggered, resting) = apply_trailing(items, tick.price);
            let fired = self.fire(triggered.iter().map(|item| item.order_id)).await?;
            store::save_trailing(self.store.as_ref(), &tick.token_address, tick.chain_id, &resting).await?;
            Ok(MatchOutcome { fired, remaining: resting.len() })
        })
        .await
    }

    /// Match one price tick against the token's price and trailing orders.
    pub async fn on_price(&self, tick: &PriceTick) -> Result<MatchOutcome, MatcherError> {
        if tick.price <= Decimal::ZERO {
            return Err(MatcherError::InvalidPrice(tick.price.to_string()));
        }

        let mut outcome = self.match_limits(tick).await?;

        // Trailing stops only protect positions, so they follow sell-side ticks
        if tick.side == Side::Sell {
            match self.match_trailing(tick).await {
                Ok(trailing) => {
                    outcome.fired.extend(trailing.fired);
                    outcome.remaining += trailing.remaining;
                }
                Err(e) => warn!(token = %tick.token_address, "Trailing orders skipped: {}", e),
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_memory_connection;
    use crate::db::order::{get_order, insert_order};
    use crate::matcher::store::{register_limit, register_trailing, MemoryOrderStore};
    use crate::models::order::{LimitOrder, OrderStatus, TriggerKind};
    use rust_decimal_macros::dec;

    fn item(order_id: i64, base_price: Decimal) -> PriceLimitItem {
        PriceLimitItem { order_id, base_price }
    }

    fn trailing(order_id: i64, base: Decimal, drawdown: Decimal, pct: Decimal) -> TrailingItem {
        TrailingItem { order_id, base_price: base, drawdown_price: drawdown, trailing_percent: pct }
    }

    async fn waiting_order(db: &Pool<Sqlite>, side: Side, price: Decimal, kind: TriggerKind) -> i64 {
        insert_order(
            db,
            &LimitOrder {
                id: 0,
                token_address: "T".to_string(),
                chain_id: 100000,
                side,
                base_price: price,
                trigger_kind: kind,
                trailing_percent: dec!(10),
                status: OrderStatus::Waiting,
                created_at: 0,
            },
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_select_crossed_by_side() {
        let items = vec![item(1, dec!(1.00)), item(2, dec!(0.90)), item(3, dec!(0.95))];

        let (buy, rest) = select_crossed(items.clone(), Side::Buy, dec!(0.95));
        assert_eq!(buy.iter().map(|i| i.order_id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(rest.iter().map(|i| i.order_id).collect::<Vec<_>>(), vec![2]);

        let (sell, rest) = select_crossed(items, Side::Sell, dec!(0.95));
        assert_eq!(sell.iter().map(|i| i.order_id).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn test_trailing_follows_and_triggers() {
        let items = vec![
            trailing(1, dec!(1.0), dec!(0.9), dec!(10)),
            trailing(2, dec!(1.2), dec!(1.1), dec!(5)),
            trailing(3, dec!(2.0), dec!(1.5), dec!(25)),
        ];

        let (triggered, resting) = apply_trailing(items, dec!(1.4));
        assert_eq!(triggered.iter().map(|i| i.order_id).collect::<Vec<_>>(), vec![3]);

        // Sorted by trailing percent; both moved up to the new high
        assert_eq!(resting[0].order_id, 2);
        assert_eq!(resting[0].base_price, dec!(1.4));
        assert_eq!(resting[0].drawdown_price, dec!(1.33));
        assert_eq!(resting[1].drawdown_price, dec!(1.26));
    }

    #[test]
    fn test_trailing_below_high_keeps_prices() {
        let (triggered, resting) = apply_trailing(vec![trailing(1, dec!(2.0), dec!(1.8), dec!(10))], dec!(1.9));
        assert!(triggered.is_empty());
        assert_eq!(resting[0].base_price, dec!(2.0));
        assert_eq!(resting[0].drawdown_price, dec!(1.8));
    }

    #[tokio::test]
    async fn test_buy_tick_fires_crossed_order_once() {
        let db = establish_memory_connection().await.unwrap();
        let store: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::new());
        let first = waiting_order(&db, Side::Buy, dec!(1.00), TriggerKind::Price).await;
        let second = waiting_order(&db, Side::Buy, dec!(0.90), TriggerKind::Price).await;
        register_limit(store.as_ref(), "T", Side::Buy, &item(first, dec!(1.00))).await.unwrap();
        register_limit(store.as_ref(), "T", Side::Buy, &item(second, dec!(0.90))).await.unwrap();

        let matcher = Matcher::new(store.clone(), db.clone());
        let tick = PriceTick { chain_id: 100000, token_address: "T".to_string(), side: Side::Buy, price: dec!(0.95) };

        let outcome = matcher.on_price(&tick).await.unwrap();
        assert_eq!(outcome.fired, vec![first]);
        assert_eq!(outcome.remaining, 1);

        let left = store::load_limits(store.as_ref(), "T", Side::Buy).await.unwrap();
        assert_eq!(left, vec![item(second, dec!(0.90))]);
        assert_eq!(get_order(&db, first).await.unwrap().unwrap().status, OrderStatus::Processing);
        assert_eq!(get_order(&db, second).await.unwrap().unwrap().status, OrderStatus::Waiting);

        let again = matcher.on_price(&tick).await.unwrap();
        assert!(again.fired.is_empty());
    }

    #[tokio::test]
    async fn test_sell_tick_runs_trailing_stops() {
        let db = establish_memory_connection().await.unwrap();
        let store: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::new());
        let stop = waiting_order(&db, Side::Sell, dec!(2.0), TriggerKind::Trailing).await;
        register_trailing(store.as_ref(), "T", 100000, &trailing(stop, dec!(2.0), dec!(1.8), dec!(10)))
            .await
            .unwrap();

        let matcher = Matcher::new(store.clone(), db.clone());
        let tick = PriceTick { chain_id: 100000, token_address: "T".to_string(), side: Side::Sell, price: dec!(1.7) };
        let outcome = matcher.on_price(&tick).await.unwrap();

        assert_eq!(outcome.fired, vec![stop]);
        assert!(store::load_trailing(store.as_ref(), "T", 100000).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_price_is_rejected() {
        let db = establish_memory_connection().await.unwrap();
        let matcher = Matcher::new(Arc::new(MemoryOrderStore::new()), db);
        let tick = PriceTick { chain_id: 100000, token_address: "T".to_string(), side: Side::Buy, price: dec!(0) };
        assert!(matches!(matcher.on_price(&tick).await, Err(MatcherError::InvalidPrice(_))));
    }
}
