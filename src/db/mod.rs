pub mod block;
pub mod connection;
pub mod migration;
pub mod order;
pub mod pair;
pub mod pool;
pub mod token;
pub mod token_account;
pub mod trade;

use thiserror::Error;

/// Static tables. Trade and token-account shards are created on demand.
pub const INIT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS block (
    slot INTEGER PRIMARY KEY,
    block_height INTEGER,
    block_time INTEGER,
    status INTEGER NOT NULL,
    sol_price TEXT NOT NULL DEFAULT '0',
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_block_status_slot ON block(status, slot);

CREATE TABLE IF NOT EXISTS pair (
    chain_id INTEGER NOT NULL,
    address TEXT NOT NULL,
    name TEXT NOT NULL,
    base_token_address TEXT NOT NULL,
    base_token_decimals INTEGER NOT NULL,
    base_token_symbol TEXT NOT NULL,
    token_address TEXT NOT NULL,
    token_decimals INTEGER NOT NULL,
    token_symbol TEXT NOT NULL,
    init_base_token_amount TEXT NOT NULL DEFAULT '0',
    init_token_amount TEXT NOT NULL DEFAULT '0',
    current_base_token_amount TEXT NOT NULL DEFAULT '0',
    current_token_amount TEXT NOT NULL DEFAULT '0',
    base_token_price TEXT NOT NULL DEFAULT '0',
    token_price TEXT NOT NULL DEFAULT '0',
    liquidity TEXT NOT NULL DEFAULT '0',
    fdv TEXT NOT NULL DEFAULT '0',
    mkt_cap TEXT NOT NULL DEFAULT '0',
    block_num INTEGER NOT NULL,
    block_time INTEGER NOT NULL,
    slot INTEGER NOT NULL,
    latest_trade_time INTEGER NOT NULL,
    pump_point TEXT NOT NULL DEFAULT '0',
    pump_status INTEGER NOT NULL DEFAULT 0,
    pump_virtual_base_token_reserves TEXT NOT NULL DEFAULT '0',
    pump_virtual_token_reserves TEXT NOT NULL DEFAULT '0',
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (chain_id, address)
);

CREATE INDEX IF NOT EXISTS idx_pair_token ON pair(token_address);

CREATE TABLE IF NOT EXISTS token (
    address TEXT PRIMARY KEY,
    chain_id INTEGER NOT NULL,
    decimals INTEGER NOT NULL,
    total_supply TEXT NOT NULL DEFAULT '0',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS raydium_pool (
    amm_id TEXT PRIMARY KEY,
    amm_authority TEXT NOT NULL,
    amm_open_orders TEXT NOT NULL,
    amm_target_orders TEXT NOT NULL,
    pool_coin_token_account TEXT NOT NULL,
    pool_pc_token_account TEXT NOT NULL,
    serum_program_id TEXT NOT NULL,
    serum_market TEXT NOT NULL,
    serum_bids TEXT NOT NULL,
    serum_asks TEXT NOT NULL,
    serum_event_queue TEXT NOT NULL,
    serum_coin_vault_account TEXT NOT NULL,
    serum_pc_vault_account TEXT NOT NULL,
    serum_vault_signer TEXT NOT NULL,
    base_mint TEXT NOT NULL,
    quote_mint TEXT NOT NULL,
    tx_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS cpmm_pool_info (
    pool_state TEXT PRIMARY KEY,
    amm_config TEXT NOT NULL,
    authority TEXT NOT NULL,
    input_vault TEXT NOT NULL,
    output_vault TEXT NOT NULL,
    input_token_program TEXT NOT NULL,
    output_token_program TEXT NOT NULL,
    input_token_mint TEXT NOT NULL,
    output_token_mint TEXT NOT NULL,
    observation_state TEXT NOT NULL,
    trade_fee_rate INTEGER NOT NULL DEFAULT 0,
    tx_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS clmm_pool_info_v1 (
    pool_state TEXT PRIMARY KEY,
    amm_config TEXT NOT NULL,
    input_vault TEXT NOT NULL,
    output_vault TEXT NOT NULL,
    observation_state TEXT NOT NULL,
    token_program TEXT NOT NULL,
    token_program_2022 TEXT NOT NULL,
    memo_program TEXT NOT NULL,
    input_vault_mint TEXT NOT NULL,
    output_vault_mint TEXT NOT NULL,
    tick_array TEXT NOT NULL,
    remaining_accounts TEXT NOT NULL DEFAULT '[]',
    trade_fee_rate INTEGER NOT NULL DEFAULT 0,
    tx_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS clmm_pool_info_v2 (
    pool_state TEXT PRIMARY KEY,
    amm_config TEXT NOT NULL,
    input_vault TEXT NOT NULL,
    output_vault TEXT NOT NULL,
    observation_state TEXT NOT NULL,
    token_program TEXT NOT NULL,
    token_program_2022 TEXT NOT NULL,
    memo_program TEXT NOT NULL,
    input_vault_mint TEXT NOT NULL,
    output_vault_mint TEXT NOT NULL,
    tick_array TEXT NOT NULL,
    remaining_accounts TEXT NOT NULL DEFAULT '[]',
    trade_fee_rate INTEGER NOT NULL DEFAULT 0,
    tx_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS pump_amm_info (
    pool_account TEXT PRIMARY KEY,
    global_config TEXT NOT NULL,
    base_mint TEXT NOT NULL,
    quote_mint TEXT NOT NULL,
    pool_base_token_account TEXT NOT NULL,
    pool_quote_token_account TEXT NOT NULL,
    protocol_fee_recipient TEXT NOT NULL,
    protocol_fee_recipient_token_account TEXT NOT NULL,
    base_token_program TEXT NOT NULL,
    quote_token_program TEXT NOT NULL,
    tx_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS limit_order (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    token_address TEXT NOT NULL,
    chain_id INTEGER NOT NULL,
    side TEXT NOT NULL,
    base_price TEXT NOT NULL,
    trigger_kind TEXT NOT NULL,
    trailing_percent TEXT NOT NULL DEFAULT '0',
    status TEXT NOT NULL DEFAULT 'waiting',
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_limit_order_token_status ON limit_order(token_address, status);
"#;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(sqlx::Error),

    #[error("Database busy or deadlocked: {0}")]
    Deadlock(String),

    #[error("Invalid value in column {column}: {value}")]
    InvalidColumn { column: &'static str, value: String },
}

// SQLITE_BUSY and SQLITE_LOCKED
const BUSY_CODES: [&str; 2] = ["5", "6"];

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let busy = db_err
                .code()
                .map(|code| BUSY_CODES.contains(&code.as_ref()))
                .unwrap_or(false);
            if busy || db_err.message().contains("database is locked") {
                return DbError::Deadlock(db_err.message().to_string());
            }
        }
        DbError::Sqlx(err)
    }
}

impl DbError {
    pub fn is_deadlock(&self) -> bool {
        matches!(self, DbError::Deadlock(_))
    }

    /// Unique or primary-key violation from a racing insert.
    pub fn is_duplicate(&self) -> bool {
        match self {
            DbError::Sqlx(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::Sqlx(sqlx::Error::RowNotFound))
    }
}

/// Column names are interpolated into shard DDL; only plain identifiers pass.
pub(crate) fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
