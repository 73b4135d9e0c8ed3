use crate::emitter::EmitError;
use crate::matcher::{MatcherPool, PriceTick};
use crate::models::amount::checked_ratio;
use crate::models::order::Side;
use crate::models::trade::{Trade, TradeType};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// One tick per pair that traded in the block, priced by its last swap in
/// base-token units.
pub fn price_ticks(trades: &[Trade]) -> Vec<PriceTick> {
    let mut last: HashMap<&str, &Trade> = HashMap::new();
    let mut order = Vec::new();

    for trade in trades.iter().filter(|t| t.trade_type.is_swap()) {
        if last.insert(trade.pair_addr.as_str(), trade).is_none() {
            order.push(trade.pair_addr.as_str());
        }
    }

    order
        .into_iter()
        .filter_map(|pair| {
            let trade = last.get(pair)?;
            let price = checked_ratio(trade.token_price_usd, trade.base_token_price_usd)?;
            let side = match trade.trade_type {
                TradeType::Buy => Side::Buy,
                _ => Side::Sell,
            };
            Some(PriceTick { chain_id: trade.chain_id, token_address: trade.token_addr.clone(), side, price })
        })
        .collect()
}

#[async_trait]
pub trait PriceNotifier: Send + Sync {
    async fn notify(&self, tick: PriceTick) -> Result<(), EmitError>;

    /// Send every tick; failures are logged and skipped.
    async fn notify_all(&self, ticks: Vec<PriceTick>) {
        for tick in ticks {
            let token = tick.token_address.clone();
            if let Err(e) = self.notify(tick).await {
                warn!(token = %token, "Price update not delivered: {}", e);
            }
        }
    }
}

/// Feeds ticks straight into the local matcher pool.
pub struct MatcherNotifier {
    pool: Arc<MatcherPool>,
}

impl MatcherNotifier {
    pub fn new(pool: Arc<MatcherPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PriceNotifier for MatcherNotifier {
    async fn notify(&self, tick: PriceTick) -> Result<(), EmitError> {
        self.pool.submit(tick).await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct TokenPriceRequest<'a> {
    chain_id: i64,
    token_address: &'a str,
    side: Side,
    price: String,
}

/// Posts ticks to a remote matcher's `/on_token_price`.
pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(endpoint: &str) -> Result<Self, EmitError> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self { client, url: format!("{}/on_token_price", endpoint.trim_end_matches('/')) })
    }
}

#[async_trait]
impl PriceNotifier for HttpNotifier {
    async fn notify(&self, tick: PriceTick) -> Result<(), EmitError> {
        let body = TokenPriceRequest {
            chain_id: tick.chain_id,
            token_address: &tick.token_address,
            side: tick.side,
            price: tick.price.to_string(),
        };
        self.client.post(&self.url).json(&body).send().await?.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trade::SwapName;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn swap(pair: &str, trade_type: TradeType, token_price: Decimal) -> Trade {
        let mut trade = Trade::new_sol(SwapName::PumpFun, trade_type);
        trade.pair_addr = pair.to_string();
        trade.token_addr = format!("{}-mint", pair);
        trade.token_price_usd = token_price;
        trade.base_token_price_usd = dec!(200);
        trade
    }

    #[test]
    fn test_last_swap_per_pair_sets_tick() {
        let trades = vec![
            swap("P", TradeType::Buy, dec!(2)),
            swap("Q", TradeType::Sell, dec!(4)),
            swap("P", TradeType::Sell, dec!(1)),
            swap("R", TradeType::AddPosition, dec!(9)),
        ];

        let ticks = price_ticks(&trades);
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].token_address, "P-mint");
        assert_eq!(ticks[0].side, Side::Sell);
        assert_eq!(ticks[0].price, dec!(0.005));
        assert_eq!(ticks[1].price, dec!(0.02));
    }

    #[test]
    fn test_unpriced_base_is_skipped() {
        let mut trade = swap("P", TradeType::Buy, dec!(2));
        trade.base_token_price_usd = Decimal::ZERO;
        assert!(price_ticks(&[trade]).is_empty());
    }

    #[test]
    fn test_http_notifier_targets_endpoint() {
        let notifier = HttpNotifier::new("http://matcher:8080/").unwrap();
        assert_eq!(notifier.url, "http://matcher:8080/on_token_price");
    }
}
