//! Program ids, well-known mints and curve constants shared by the decoders.

use solana_sdk::{pubkey, pubkey::Pubkey};

pub const SOL_CHAIN_ID: i64 = 100000;

pub const WSOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");
pub const USDC_MINT: Pubkey = pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
pub const USDT_MINT: Pubkey = pubkey!("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB");

pub const SOL_DECIMALS: u8 = 9;
pub const SOL_SYMBOL: &str = "SOL";

// DEX programs decoded into trades
pub const RAYDIUM_V4_PROGRAM: Pubkey = pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");
pub const RAYDIUM_CPMM_PROGRAM: Pubkey = pubkey!("CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C");
pub const RAYDIUM_CLMM_PROGRAM: Pubkey = pubkey!("CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK");
pub const PUMP_FUN_PROGRAM: Pubkey = pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");
pub const PUMP_AMM_PROGRAM: Pubkey = pubkey!("pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA");
pub const TOKEN_PROGRAM: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const TOKEN_2022_PROGRAM: Pubkey = pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

// Pools scanned by the price oracle for SOL/stable swaps
pub const ORCA_WHIRLPOOL_PROGRAM: Pubkey = pubkey!("whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc");
pub const METEORA_DLMM_PROGRAM: Pubkey = pubkey!("LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo");
pub const PHOENIX_PROGRAM: Pubkey = pubkey!("PhoeNiXZ8ByJGLkxNfZRnkUfjvmuYqLR89jjFHGqdXY");

pub const STABLE_SWAP_PROGRAMS: [Pubkey; 4] = [
    ORCA_WHIRLPOOL_PROGRAM,
    RAYDIUM_CLMM_PROGRAM,
    METEORA_DLMM_PROGRAM,
    PHOENIX_PROGRAM,
];

/// pump.fun bonding curve: `virtual_token_reserves - real_token_reserves`.
pub const PUMP_TOKEN_RESERVES_DIFF: u64 = 279_900_000_000_000;
/// pump.fun bonding curve: `virtual_sol_reserves - real_sol_reserves`.
pub const PUMP_SOL_RESERVES_DIFF: u64 = 30_000_000_000;
/// Tokens sold along the curve before migration, in whole tokens.
pub const PUMP_INIT_TOKEN_AMOUNT: u64 = 873_000_000;
/// Virtual token supply of a fresh curve, in whole tokens.
pub const PUMP_VIRTUAL_INIT_TOKEN_AMOUNT: u64 = 1_073_000_191;
/// Virtual SOL of a fresh curve, in whole SOL.
pub const PUMP_VIRTUAL_INIT_SOL_AMOUNT: u64 = 30;
/// Initial SOL recorded for a freshly created pump pair, in milli-SOL (0.015 SOL).
pub const PUMP_INIT_SOL_MILLIS: i64 = 15;
/// Seeded token price on creation, as a multiple of the SOL price (7.75e-9).
pub const PUMP_CREATE_PRICE_FACTOR_E11: i64 = 775;
/// Pump point at which a curve counts as migrating.
pub const PUMP_MIGRATING_THRESHOLD_MILLIS: i64 = 999;

pub const TRADE_BATCH_SIZE: usize = 1024;
pub const SLOT_SAFETY_MARGIN: u64 = 100;
