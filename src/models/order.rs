//! Limit-order types shared by the matcher, its store and the orders table.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Price,
    MarketCap,
    Trailing,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Price => "price",
            TriggerKind::MarketCap => "market_cap",
            TriggerKind::Trailing => "trailing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Waiting,
    Processing,
    OnChain,
    Success,
    Failed,
    Cancelled,
    TimedOut,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Waiting => "waiting",
            OrderStatus::Processing => "processing",
            OrderStatus::OnChain => "on_chain",
            OrderStatus::Success => "success",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::TimedOut => "timed_out",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(OrderStatus::Waiting),
            "processing" => Some(OrderStatus::Processing),
            "on_chain" => Some(OrderStatus::OnChain),
            "success" => Some(OrderStatus::Success),
            "failed" => Some(OrderStatus::Failed),
            "cancelled" => Some(OrderStatus::Cancelled),
            "timed_out" => Some(OrderStatus::TimedOut),
            _ => None,
        }
    }

    /// Allowed lifecycle moves.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Waiting, Processing)
                | (Waiting, Cancelled)
                | (Waiting, TimedOut)
                | (Processing, OnChain)
                | (Processing, Cancelled)
                | (Processing, TimedOut)
                | (OnChain, Success)
                | (OnChain, Failed)
        )
    }

    /// Orders in these states are never picked up again.
    pub fn is_final(&self) -> bool {
        !matches!(self, OrderStatus::Waiting)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub id: i64,
    pub token_address: String,
    pub chain_id: i64,
    pub side: Side,
    pub base_price: Decimal,
    pub trigger_kind: TriggerKind,
    pub trailing_percent: Decimal,
    pub status: OrderStatus,
    pub created_at: i64,
}

/// Entry of a `limit:{token}:{side}` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLimitItem {
    pub order_id: i64,
    pub base_price: Decimal,
}

/// Entry of a `trailing:{token}:{chain}` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingItem {
    pub order_id: i64,
    pub base_price: Decimal,
    pub drawdown_price: Decimal,
    pub trailing_percent: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_lifecycle() {
        assert!(OrderStatus::Waiting.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::OnChain.can_transition_to(OrderStatus::Success));
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Waiting));
        assert!(!OrderStatus::Success.can_transition_to(OrderStatus::Failed));
        assert_eq!(OrderStatus::parse("timed_out"), Some(OrderStatus::TimedOut));
        assert!(OrderStatus::Cancelled.is_final());
        assert!(!OrderStatus::Waiting.is_final());
    }
}
