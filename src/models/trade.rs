use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{SOL_CHAIN_ID, SOL_DECIMALS, SOL_SYMBOL, WSOL_MINT};
use crate::models::amount::{checked_ratio, raw_to_decimal};
use crate::models::pool::PoolInfo;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeType {
    #[default]
    Buy,
    Sell,
    AddPosition,
    RemovePosition,
    Create,
    OpenPosition,
    TokenMint,
    TokenBurn,
    PumpCreate,
    PumpCreatePool,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Buy => "buy",
            TradeType::Sell => "sell",
            TradeType::AddPosition => "add_position",
            TradeType::RemovePosition => "remove_position",
            TradeType::Create => "create",
            TradeType::OpenPosition => "open_position",
            TradeType::TokenMint => "token_mint",
            TradeType::TokenBurn => "token_burn",
            TradeType::PumpCreate => "pump_create",
            TradeType::PumpCreatePool => "pump_create_pool",
        }
    }

    pub fn is_swap(&self) -> bool {
        matches!(self, TradeType::Buy | TradeType::Sell)
    }

    /// Supply-changing token program events carry no pair.
    pub fn is_token_event(&self) -> bool {
        matches!(self, TradeType::TokenMint | TradeType::TokenBurn)
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exchange tag stored on trades and pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapName {
    #[default]
    RaydiumV4,
    RaydiumCpmm,
    RaydiumClmm,
    PumpFun,
    PumpAmm,
    Token,
}

impl SwapName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapName::RaydiumV4 => "RaydiumV4",
            SwapName::RaydiumCpmm => "RaydiumCPMM",
            SwapName::RaydiumClmm => "RaydiumConcentratedLiquidity",
            SwapName::PumpFun => "PumpFun",
            SwapName::PumpAmm => "PumpSwap",
            SwapName::Token => "Token",
        }
    }
}

impl fmt::Display for SwapName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpStatus {
    #[default]
    None,
    Create,
    Trading,
    Migrating,
}

impl PumpStatus {
    pub fn as_i64(&self) -> i64 {
        match self {
            PumpStatus::None => 0,
            PumpStatus::Create => 1,
            PumpStatus::Trading => 2,
            PumpStatus::Migrating => 3,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => PumpStatus::Create,
            2 => PumpStatus::Trading,
            3 => PumpStatus::Migrating,
            _ => PumpStatus::None,
        }
    }
}

/// Bonding-curve progress carried by pump.fun and PumpAMM trades.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PumpCurve {
    pub point: Decimal,
    pub status: PumpStatus,
    pub virtual_base_reserves: Decimal,
    pub virtual_token_reserves: Decimal,
}

/// Pool creation parameters recorded for CLMM `create_pool`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClmmCreate {
    pub amm_config: String,
    pub sqrt_price_x64: u128,
    pub open_time: u64,
    pub trade_fee_rate: u32,
}

/// Raw integer amounts behind the decimal fields. Decoders that could not
/// resolve a mint's decimals from the transaction leave `decimals_pending`
/// set, and the enrichment pass rescales from these values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAmounts {
    pub base: u64,
    pub token: u64,
    pub base_reserve: u64,
    pub token_reserve: u64,
    pub init_base: u64,
    pub init_token: u64,
}

/// Payload of a `token_mint` / `token_burn` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplyChange {
    pub mint: String,
    pub account: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub chain_id: i64,
    pub slot: u64,
    pub block_num: u64,
    pub block_time: i64,
    pub tx_index: u32,
    pub log_index: u32,
    pub hash_id: String,
    pub tx_hash: String,
    pub pair_addr: String,
    pub maker: String,
    pub to: String,
    #[serde(rename = "type")]
    pub trade_type: TradeType,
    pub swap_name: SwapName,

    pub base_token_addr: String,
    pub base_token_decimals: u8,
    pub base_token_symbol: String,
    pub token_addr: String,
    pub token_decimals: u8,
    pub token_symbol: String,
    pub token_account: String,

    pub base_token_amount: Decimal,
    pub token_amount: Decimal,
    pub base_token_price_usd: Decimal,
    pub token_price_usd: Decimal,
    pub total_usd: Decimal,

    pub current_base_token_in_pool_amount: Decimal,
    pub current_token_in_pool_amount: Decimal,
    pub init_base_token_amount: Decimal,
    pub init_token_amount: Decimal,

    pub pump: Option<PumpCurve>,
    pub pool: Option<PoolInfo>,
    pub clmm_create: Option<ClmmCreate>,
    /// CLMM position liquidity, saturated into a decimal.
    pub position_liquidity: Option<Decimal>,
    pub supply_change: Option<SupplyChange>,

    pub clamp: bool,
    pub create_time: i64,

    #[serde(skip)]
    pub raw: RawAmounts,
    #[serde(skip)]
    pub decimals_pending: bool,
}

impl Trade {
    /// A trade against wrapped SOL with the chain defaults filled in.
    pub fn new_sol(swap_name: SwapName, trade_type: TradeType) -> Self {
        Self {
            chain_id: SOL_CHAIN_ID,
            swap_name,
            trade_type,
            base_token_addr: WSOL_MINT.to_string(),
            base_token_decimals: SOL_DECIMALS,
            base_token_symbol: SOL_SYMBOL.to_string(),
            ..Default::default()
        }
    }

    pub fn make_hash_id(slot: u64, tx_index: u32) -> String {
        format!("{}#{}", slot, tx_index)
    }

    /// `total_usd = base * base_price`, `token_price = total_usd / token_amount`.
    /// Returns false when the token amount is zero and no price can be set.
    pub fn apply_prices(&mut self, base_price_usd: Decimal) -> bool {
        self.base_token_price_usd = base_price_usd;
        self.total_usd = self
            .base_token_amount
            .checked_mul(base_price_usd)
            .unwrap_or(Decimal::ZERO);

        match checked_ratio(self.total_usd, self.token_amount) {
            Some(price) => {
                self.token_price_usd = price;
                true
            }
            None => false,
        }
    }

    /// Recompute the decimal amounts and reserves from the raw integers.
    pub fn rescale(&mut self) {
        self.base_token_amount = raw_to_decimal(self.raw.base, self.base_token_decimals);
        self.token_amount = raw_to_decimal(self.raw.token, self.token_decimals);
        self.current_base_token_in_pool_amount =
            raw_to_decimal(self.raw.base_reserve, self.base_token_decimals);
        self.current_token_in_pool_amount =
            raw_to_decimal(self.raw.token_reserve, self.token_decimals);

        // Pool openings carry their seed amounts on chain
        if self.raw.init_base != 0 || self.raw.init_token != 0 {
            self.init_base_token_amount = raw_to_decimal(self.raw.init_base, self.base_token_decimals);
            self.init_token_amount = raw_to_decimal(self.raw.init_token, self.token_decimals);
        }
    }

    /// Ordering key: block time in ns, then transaction and log position.
    pub fn sort_key(&self) -> i64 {
        self.block_time
            .saturating_mul(1_000_000_000)
            .saturating_add(self.tx_index as i64 * 1_000)
            .saturating_add(self.log_index as i64)
    }
}
