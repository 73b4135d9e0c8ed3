//! Raydium CLMM (concentrated liquidity, Anchor).

use crate::blockchain::models::RawInstruction;
use crate::constants::WSOL_MINT;
use crate::decoder::events::{decode_prefix, instruction_discriminator, split_discriminator};
use crate::decoder::{
    apply_legs, apply_vault_reserves, finish_swap, require_accounts, transfer_swap, vault_liquidity, DecodeContext,
    DecodeError, DecodeResult, VaultPair,
};
use crate::models::amount::u128_to_decimal;
use crate::models::pool::{ClmmPoolInfo, ClmmVersion, PoolInfo};
use crate::models::trade::{ClmmCreate, SwapName, Trade, TradeType};
use borsh::BorshDeserialize;
use solana_sdk::pubkey::Pubkey;
use std::sync::LazyLock;

const NAME: &str = "RaydiumCLMM";

const SWAP_ACCOUNTS: usize = 10;
const SWAP_V2_ACCOUNTS: usize = 13;
const CREATE_POOL_ACCOUNTS: usize = 8;
const OPEN_POSITION_ACCOUNTS: usize = 14;
const INCREASE_LIQUIDITY_V2_ACCOUNTS: usize = 15;
const DECREASE_LIQUIDITY_V2_ACCOUNTS: usize = 16;

static SWAP: LazyLock<[u8; 8]> = LazyLock::new(|| instruction_discriminator("swap"));
static SWAP_V2: LazyLock<[u8; 8]> = LazyLock::new(|| instruction_discriminator("swap_v2"));
static CREATE_POOL: LazyLock<[u8; 8]> = LazyLock::new(|| instruction_discriminator("create_pool"));
static OPEN_POSITION: LazyLock<[u8; 8]> = LazyLock::new(|| instruction_discriminator("open_position"));
static OPEN_POSITION_V2: LazyLock<[u8; 8]> = LazyLock::new(|| instruction_discriminator("open_position_v2"));
static INCREASE_LIQUIDITY_V2: LazyLock<[u8; 8]> = LazyLock::new(|| instruction_discriminator("increase_liquidity_v2"));
static DECREASE_LIQUIDITY_V2: LazyLock<[u8; 8]> = LazyLock::new(|| instruction_discriminator("decrease_liquidity_v2"));

#[derive(BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatePoolArgs {
    pub sqrt_price_x64: u128,
    pub open_time: u64,
}

/// Leading arguments shared by `open_position` and `open_position_v2`.
#[derive(BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenPositionArgs {
    pub tick_lower_index: i32,
    pub tick_upper_index: i32,
    pub tick_array_lower_start_index: i32,
    pub tick_array_upper_start_index: i32,
    pub liquidity: u128,
    pub amount_0_max: u64,
    pub amount_1_max: u64,
}

/// Leading argument of both liquidity v2 instructions.
#[derive(BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidityArgs {
    pub liquidity: u128,
}

pub fn decode(ctx: &mut DecodeContext<'_>, ix: &RawInstruction, inner: Option<&[RawInstruction]>) -> DecodeResult {
    let Some((discriminator, args)) = split_discriminator(&ix.data) else {
        return Ok(None);
    };

    if discriminator == *SWAP {
        decode_swap(ctx, ix, inner, ClmmVersion::V1)
    } else if discriminator == *SWAP_V2 {
        decode_swap(ctx, ix, inner, ClmmVersion::V2)
    } else if discriminator == *CREATE_POOL {
        decode_create_pool(ctx, ix, args)
    } else if discriminator == *OPEN_POSITION || discriminator == *OPEN_POSITION_V2 {
        decode_open_position(ctx, ix, inner, args)
    } else if discriminator == *INCREASE_LIQUIDITY_V2 {
        decode_liquidity(ctx, ix, inner, args, TradeType::AddPosition)
    } else if discriminator == *DECREASE_LIQUIDITY_V2 {
        decode_liquidity(ctx, ix, inner, args, TradeType::RemovePosition)
    } else {
        Ok(None)
    }
}

fn decode_swap(
    ctx: &mut DecodeContext<'_>,
    ix: &RawInstruction,
    inner: Option<&[RawInstruction]>,
    version: ClmmVersion,
) -> DecodeResult {
    let min = match version {
        ClmmVersion::V1 => SWAP_ACCOUNTS,
        ClmmVersion::V2 => SWAP_V2_ACCOUNTS,
    };
    require_accounts(ix, min, NAME)?;

    let payer = ix.accounts[0];
    let pool_state = ix.accounts[2];
    let from = ix.accounts[3];
    let to = ix.accounts[4];
    let input_vault = ix.accounts[5];
    let output_vault = ix.accounts[6];

    let legs = transfer_swap(ctx, inner, &from, &to)?;

    let mut trade = Trade::new_sol(SwapName::RaydiumClmm, TradeType::Buy);
    trade.pair_addr = pool_state.to_string();
    trade.maker = payer.to_string();
    apply_legs(&mut trade, &legs);
    apply_vault_reserves(ctx, &mut trade, &legs.token.mint, &[input_vault, output_vault]);

    let at = |index: usize| ix.accounts[index].to_string();
    let vault_mint = |vault: &Pubkey| ctx.account(vault).map(|account| account.mint.to_string()).unwrap_or_default();

    // v2 names both vault mints; v1 resolves them through the snapshot
    let pool = match version {
        ClmmVersion::V1 => ClmmPoolInfo {
            version,
            pool_state: at(2),
            amm_config: at(1),
            input_vault: at(5),
            output_vault: at(6),
            observation_state: at(7),
            token_program: at(8),
            token_program_2022: String::new(),
            memo_program: String::new(),
            input_vault_mint: vault_mint(&input_vault),
            output_vault_mint: vault_mint(&output_vault),
            tick_array: at(9),
            remaining_accounts: ix.accounts[SWAP_ACCOUNTS..].iter().map(|key| key.to_string()).collect(),
            trade_fee_rate: 0,
            tx_hash: ctx.tx_hash().to_string(),
        },
        ClmmVersion::V2 => ClmmPoolInfo {
            version,
            pool_state: at(2),
            amm_config: at(1),
            input_vault: at(5),
            output_vault: at(6),
            observation_state: at(7),
            token_program: at(8),
            token_program_2022: at(9),
            memo_program: at(10),
            input_vault_mint: at(11),
            output_vault_mint: at(12),
            tick_array: String::new(),
            remaining_accounts: ix.accounts[SWAP_V2_ACCOUNTS..].iter().map(|key| key.to_string()).collect(),
            trade_fee_rate: 0,
            tx_hash: ctx.tx_hash().to_string(),
        },
    };
    trade.pool = Some(PoolInfo::Clmm(pool));

    finish_swap(trade)
}

/// New pool. Wrapped SOL becomes the base side when present.
fn decode_create_pool(ctx: &mut DecodeContext<'_>, ix: &RawInstruction, args: &[u8]) -> DecodeResult {
    require_accounts(ix, CREATE_POOL_ACCOUNTS, NAME)?;

    let params: CreatePoolArgs = decode_prefix(args).ok_or_else(|| DecodeError::invalid("create_pool arguments"))?;

    let creator = ix.accounts[0];
    let amm_config = ix.accounts[1];
    let pool_state = ix.accounts[2];
    let (mint_0, mint_1) = (ix.accounts[3], ix.accounts[4]);
    let (vault_0, vault_1) = (ix.accounts[5], ix.accounts[6]);

    let (token_mint, token_vault, base_vault) = if mint_0 == WSOL_MINT {
        (mint_1, vault_1, vault_0)
    } else if mint_1 == WSOL_MINT {
        (mint_0, vault_0, vault_1)
    } else {
        return Err(DecodeError::UnsupportedSwap);
    };

    let mut trade = Trade::new_sol(SwapName::RaydiumClmm, TradeType::Create);
    trade.pair_addr = pool_state.to_string();
    trade.maker = creator.to_string();
    trade.to = pool_state.to_string();
    trade.token_addr = token_mint.to_string();
    match ctx.decimals_of(&token_vault) {
        Some(decimals) => trade.token_decimals = decimals,
        None => trade.decimals_pending = true,
    }

    trade.clmm_create = Some(ClmmCreate {
        amm_config: amm_config.to_string(),
        sqrt_price_x64: params.sqrt_price_x64,
        open_time: params.open_time,
        trade_fee_rate: 0,
    });
    trade.pool = Some(PoolInfo::Clmm(ClmmPoolInfo {
        version: ClmmVersion::V1,
        pool_state: pool_state.to_string(),
        amm_config: amm_config.to_string(),
        input_vault: base_vault.to_string(),
        output_vault: token_vault.to_string(),
        observation_state: ix.accounts[7].to_string(),
        token_program: String::new(),
        token_program_2022: String::new(),
        memo_program: String::new(),
        input_vault_mint: WSOL_MINT.to_string(),
        output_vault_mint: token_mint.to_string(),
        tick_array: String::new(),
        remaining_accounts: Vec::new(),
        trade_fee_rate: 0,
        tx_hash: ctx.tx_hash().to_string(),
    }));

    Ok(Some(trade))
}

fn decode_open_position(
    ctx: &mut DecodeContext<'_>,
    ix: &RawInstruction,
    inner: Option<&[RawInstruction]>,
    args: &[u8],
) -> DecodeResult {
    require_accounts(ix, OPEN_POSITION_ACCOUNTS, NAME)?;

    let params: OpenPositionArgs =
        decode_prefix(args).ok_or_else(|| DecodeError::invalid("open_position arguments"))?;

    let pool_state = ix.accounts[5];
    let mut trade = Trade::new_sol(SwapName::RaydiumClmm, TradeType::OpenPosition);
    trade.pair_addr = pool_state.to_string();
    trade.maker = ix.accounts[0].to_string();
    trade.to = pool_state.to_string();
    trade.position_liquidity = Some(u128_to_decimal(params.liquidity));

    let vaults = VaultPair { vaults: [ix.accounts[12], ix.accounts[13]], mints: None };
    vault_liquidity(ctx, &mut trade, &vaults, inner, true)?;
    Ok(Some(trade))
}

fn decode_liquidity(
    ctx: &mut DecodeContext<'_>,
    ix: &RawInstruction,
    inner: Option<&[RawInstruction]>,
    args: &[u8],
    trade_type: TradeType,
) -> DecodeResult {
    // The two instructions order their accounts differently
    let (min, pool_index, vaults, mints) = if trade_type == TradeType::AddPosition {
        (INCREASE_LIQUIDITY_V2_ACCOUNTS, 2, (9, 10), (13, 14))
    } else {
        (DECREASE_LIQUIDITY_V2_ACCOUNTS, 3, (5, 6), (14, 15))
    };
    require_accounts(ix, min, NAME)?;

    let params: LiquidityArgs = decode_prefix(args).ok_or_else(|| DecodeError::invalid("liquidity arguments"))?;

    let pool_state = ix.accounts[pool_index];
    let mut trade = Trade::new_sol(SwapName::RaydiumClmm, trade_type);
    trade.pair_addr = pool_state.to_string();
    trade.maker = ix.accounts[0].to_string();
    trade.to = pool_state.to_string();
    trade.position_liquidity = Some(u128_to_decimal(params.liquidity));

    let pair = VaultPair {
        vaults: [ix.accounts[vaults.0], ix.accounts[vaults.1]],
        mints: Some([ix.accounts[mints.0], ix.accounts[mints.1]]),
    };
    vault_liquidity(ctx, &mut trade, &pair, inner, trade_type == TradeType::AddPosition)?;
    Ok(Some(trade))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::models::fixtures::*;
    use crate::blockchain::models::RawTransaction;
    use crate::constants::{RAYDIUM_CLMM_PROGRAM, TOKEN_PROGRAM};
    use crate::decoder::{decode_transaction, snapshot, EventCounter, TokenAccountMap};
    use rust_decimal_macros::dec;

    const MINT: u8 = 90;

    fn decode_tx(tx: &RawTransaction) -> Vec<Trade> {
        let mut accounts = TokenAccountMap::new();
        snapshot(&mut accounts, tx);
        let mut events = EventCounter::new();
        decode_transaction(tx, 0, &accounts, dec!(150), &mut events, false).unwrap()
    }

    fn with_args(discriminator: &[u8; 8], args: &[u8]) -> Vec<u8> {
        let mut data = discriminator.to_vec();
        data.extend_from_slice(args);
        data
    }

    #[test]
    fn test_swap_v2_keeps_remaining_accounts() {
        let maker = key(1);
        let pool_authority = key(2);
        let mut accounts: Vec<Pubkey> = (0..15).map(|i| key(200 + i)).collect();
        accounts[0] = maker;
        accounts[2] = key(50);
        accounts[3] = key(10);
        accounts[4] = key(11);
        accounts[5] = key(12);
        accounts[6] = key(13);
        accounts[11] = WSOL_MINT;
        accounts[12] = key(MINT);

        let tx = TxBuilder::new("clmm-buy")
            .signer(maker)
            .balance(key(10), WSOL_MINT, maker, 9, Some(3_000_000_000), Some(0))
            .balance(key(11), key(MINT), maker, 6, Some(0), Some(6_000_000))
            .balance(key(12), WSOL_MINT, pool_authority, 9, Some(0), Some(3_000_000_000))
            .balance(key(13), key(MINT), pool_authority, 6, Some(9_000_000), Some(3_000_000))
            .instruction(RAYDIUM_CLMM_PROGRAM, accounts, with_args(&SWAP_V2, &[0u8; 33]))
            .inner(0, TOKEN_PROGRAM, vec![key(10), key(12), maker], transfer_data(3_000_000_000))
            .inner(0, TOKEN_PROGRAM, vec![key(13), key(11), pool_authority], transfer_data(6_000_000))
            .build();

        let trades = decode_tx(&tx);
        let trade = &trades[0];
        assert_eq!(trade.trade_type, TradeType::Buy);
        assert_eq!(trade.token_amount, dec!(6));
        assert_eq!(trade.total_usd, dec!(450));
        assert_eq!(trade.token_price_usd, dec!(75));
        assert_eq!(trade.current_token_in_pool_amount, dec!(3));

        match trade.pool.as_ref() {
            Some(PoolInfo::Clmm(pool)) => {
                assert_eq!(pool.version, ClmmVersion::V2);
                assert_eq!(pool.remaining_accounts, vec![key(213).to_string(), key(214).to_string()]);
                assert_eq!(pool.output_vault_mint, key(MINT).to_string());
            }
            other => panic!("unexpected pool {:?}", other),
        }
    }

    #[test]
    fn test_decrease_liquidity_maps_to_remove_position() {
        let owner = key(1);
        let mut accounts: Vec<Pubkey> = (0..16).map(|i| key(220 + i)).collect();
        accounts[0] = owner;
        accounts[3] = key(50);
        accounts[5] = key(12);
        accounts[6] = key(13);
        accounts[9] = key(10);
        accounts[10] = key(11);
        accounts[14] = WSOL_MINT;
        accounts[15] = key(MINT);

        let mut args = 1_000_000u128.to_le_bytes().to_vec();
        args.extend_from_slice(&[0u8; 16]);

        let tx = TxBuilder::new("clmm-decrease")
            .signer(owner)
            .balance(key(12), WSOL_MINT, key(2), 9, Some(4_000_000_000), Some(3_000_000_000))
            .balance(key(13), key(MINT), key(2), 6, Some(8_000_000), Some(6_000_000))
            .instruction(RAYDIUM_CLMM_PROGRAM, accounts, with_args(&DECREASE_LIQUIDITY_V2, &args))
            .inner(0, TOKEN_PROGRAM, vec![key(12), key(10), key(2)], transfer_data(1_000_000_000))
            .inner(0, TOKEN_PROGRAM, vec![key(13), key(11), key(2)], transfer_data(2_000_000))
            .build();

        let trades = decode_tx(&tx);
        let trade = &trades[0];
        assert_eq!(trade.trade_type, TradeType::RemovePosition);
        assert_eq!(trade.pair_addr, key(50).to_string());
        assert_eq!(trade.base_token_amount, dec!(1));
        assert_eq!(trade.token_amount, dec!(2));
        assert_eq!(trade.current_base_token_in_pool_amount, dec!(3));
        assert_eq!(trade.position_liquidity, Some(dec!(1000000)));
    }

    #[test]
    fn test_create_pool_orients_wsol_as_base() {
        let mut accounts: Vec<Pubkey> = (0..13).map(|i| key(240 + i)).collect();
        accounts[0] = key(1);
        accounts[2] = key(50);
        accounts[3] = key(MINT);
        accounts[4] = WSOL_MINT;
        accounts[5] = key(12);
        accounts[6] = key(13);

        let sqrt_price: u128 = 1 << 64;
        let mut args = sqrt_price.to_le_bytes().to_vec();
        args.extend_from_slice(&0u64.to_le_bytes());

        let tx = TxBuilder::new("clmm-create")
            .signer(key(1))
            .instruction(RAYDIUM_CLMM_PROGRAM, accounts, with_args(&CREATE_POOL, &args))
            .build();

        let trades = decode_tx(&tx);
        let trade = &trades[0];
        assert_eq!(trade.trade_type, TradeType::Create);
        assert_eq!(trade.token_addr, key(MINT).to_string());
        assert!(trade.decimals_pending);
        assert_eq!(trade.clmm_create.as_ref().map(|c| c.sqrt_price_x64), Some(sqrt_price));
        match trade.pool.as_ref() {
            Some(PoolInfo::Clmm(pool)) => assert_eq!(pool.input_vault, key(13).to_string()),
            other => panic!("unexpected pool {:?}", other),
        }
    }
}
