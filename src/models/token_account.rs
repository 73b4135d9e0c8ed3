use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolderStatus {
    Open,
    Closed,
}

impl HolderStatus {
    pub fn as_i64(&self) -> i64 {
        match self {
            HolderStatus::Open => 0,
            HolderStatus::Closed => 1,
        }
    }
}

/// One row of a weekly `sol_token_account_*` shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHolderBalance {
    pub chain_id: i64,
    pub token_address: String,
    pub owner: String,
    pub token_account_address: String,
    pub balance: u64,
    pub decimals: u8,
    pub slot: u64,
    pub status: HolderStatus,
    /// Unix seconds; replaced by the mint's `created_at` before writing.
    pub created_at: i64,
}
