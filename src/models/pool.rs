//! Pool metadata captured from swap instructions. Each record holds the
//! accounts needed to build the same swap again plus the current fee.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaydiumPool {
    pub amm_id: String,
    pub amm_authority: String,
    pub amm_open_orders: String,
    pub amm_target_orders: String,
    pub pool_coin_token_account: String,
    pub pool_pc_token_account: String,
    pub serum_program_id: String,
    pub serum_market: String,
    pub serum_bids: String,
    pub serum_asks: String,
    pub serum_event_queue: String,
    pub serum_coin_vault_account: String,
    pub serum_pc_vault_account: String,
    pub serum_vault_signer: String,
    pub base_mint: String,
    pub quote_mint: String,
    pub tx_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpmmPoolInfo {
    pub pool_state: String,
    pub amm_config: String,
    pub authority: String,
    pub input_vault: String,
    pub output_vault: String,
    pub input_token_program: String,
    pub output_token_program: String,
    pub input_token_mint: String,
    pub output_token_mint: String,
    pub observation_state: String,
    pub trade_fee_rate: u64,
    pub tx_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClmmVersion {
    V1,
    V2,
}

impl ClmmVersion {
    pub fn table(&self) -> &'static str {
        match self {
            ClmmVersion::V1 => "clmm_pool_info_v1",
            ClmmVersion::V2 => "clmm_pool_info_v2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClmmPoolInfo {
    pub version: ClmmVersion,
    pub pool_state: String,
    pub amm_config: String,
    pub input_vault: String,
    pub output_vault: String,
    pub observation_state: String,
    pub token_program: String,
    pub token_program_2022: String,
    pub memo_program: String,
    pub input_vault_mint: String,
    pub output_vault_mint: String,
    /// First tick array; only the v1 swap names it explicitly.
    pub tick_array: String,
    pub remaining_accounts: Vec<String>,
    pub trade_fee_rate: u32,
    pub tx_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PumpAmmInfo {
    pub pool_account: String,
    pub global_config: String,
    pub base_mint: String,
    pub quote_mint: String,
    pub pool_base_token_account: String,
    pub pool_quote_token_account: String,
    pub protocol_fee_recipient: String,
    pub protocol_fee_recipient_token_account: String,
    pub base_token_program: String,
    pub quote_token_program: String,
    pub tx_hash: String,
}

/// Pool record attached to a decoded trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolInfo {
    RaydiumV4(RaydiumPool),
    Cpmm(CpmmPoolInfo),
    Clmm(ClmmPoolInfo),
    PumpAmm(PumpAmmInfo),
}
