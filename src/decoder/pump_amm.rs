//! PumpAMM (PumpSwap), the constant-product pools pump.fun curves migrate to.

use crate::blockchain::models::RawInstruction;
use crate::constants::{PUMP_INIT_SOL_MILLIS, PUMP_VIRTUAL_INIT_TOKEN_AMOUNT, WSOL_MINT};
use crate::decoder::events::{decode_prefix, event_discriminator, events_with_discriminator, instruction_discriminator, split_discriminator};
use crate::decoder::pump::curve_progress;
use crate::decoder::{require_accounts, DecodeContext, DecodeError, DecodeResult};
use crate::models::pool::{PoolInfo, PumpAmmInfo};
use crate::models::trade::{PumpCurve, SwapName, Trade, TradeType};
use borsh::BorshDeserialize;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::sync::LazyLock;

const NAME: &str = "PumpAMM";

const SWAP_MIN_ACCOUNTS: usize = 13;
const CREATE_POOL_MIN_ACCOUNTS: usize = 11;

static BUY: LazyLock<[u8; 8]> = LazyLock::new(|| instruction_discriminator("buy"));
static SELL: LazyLock<[u8; 8]> = LazyLock::new(|| instruction_discriminator("sell"));
static CREATE_POOL: LazyLock<[u8; 8]> = LazyLock::new(|| instruction_discriminator("create_pool"));

static BUY_EVENT: LazyLock<[u8; 8]> = LazyLock::new(|| event_discriminator("BuyEvent"));
static SELL_EVENT: LazyLock<[u8; 8]> = LazyLock::new(|| event_discriminator("SellEvent"));
static CREATE_POOL_EVENT: LazyLock<[u8; 8]> = LazyLock::new(|| event_discriminator("CreatePoolEvent"));

#[derive(BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct BuyEvent {
    pub timestamp: i64,
    pub base_amount_out: u64,
    pub max_quote_amount_in: u64,
    pub user_base_token_reserves: u64,
    pub user_quote_token_reserves: u64,
    pub pool_base_token_reserves: u64,
    pub pool_quote_token_reserves: u64,
    pub quote_amount_in: u64,
    pub lp_fee_basis_points: u64,
    pub lp_fee: u64,
    pub protocol_fee_basis_points: u64,
    pub protocol_fee: u64,
    pub quote_amount_in_with_lp_fee: u64,
    pub user_quote_amount_in: u64,
    pub pool: [u8; 32],
    pub user: [u8; 32],
    pub user_base_token_account: [u8; 32],
    pub user_quote_token_account: [u8; 32],
    pub protocol_fee_recipient: [u8; 32],
    pub protocol_fee_recipient_token_account: [u8; 32],
}

#[derive(BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct SellEvent {
    pub timestamp: i64,
    pub base_amount_in: u64,
    pub min_quote_amount_out: u64,
    pub user_base_token_reserves: u64,
    pub user_quote_token_reserves: u64,
    pub pool_base_token_reserves: u64,
    pub pool_quote_token_reserves: u64,
    pub quote_amount_out: u64,
    pub lp_fee_basis_points: u64,
    pub lp_fee: u64,
    pub protocol_fee_basis_points: u64,
    pub protocol_fee: u64,
    pub quote_amount_out_without_lp_fee: u64,
    pub user_quote_amount_out: u64,
    pub pool: [u8; 32],
    pub user: [u8; 32],
    pub user_base_token_account: [u8; 32],
    pub user_quote_token_account: [u8; 32],
    pub protocol_fee_recipient: [u8; 32],
    pub protocol_fee_recipient_token_account: [u8; 32],
}

#[derive(BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct CreatePoolEvent {
    pub timestamp: i64,
    pub index: u16,
    pub creator: [u8; 32],
    pub base_mint: [u8; 32],
    pub quote_mint: [u8; 32],
    pub base_mint_decimals: u8,
    pub quote_mint_decimals: u8,
    pub base_amount_in: u64,
    pub quote_amount_in: u64,
    pub pool_base_amount: u64,
    pub pool_quote_amount: u64,
    pub minimum_liquidity: u64,
    pub initial_liquidity: u64,
    pub lp_token_amount_out: u64,
    pub pool_bump: u8,
    pub pool: [u8; 32],
    pub lp_mint: [u8; 32],
    pub user_base_token_account: [u8; 32],
    pub user_quote_token_account: [u8; 32],
}

/// Amounts shared by buy and sell events, in pool orientation: the pool's
/// base mint is the traded token and its quote mint is wrapped SOL.
struct Fill {
    sol: u64,
    tokens: u64,
    pool_tokens: u64,
    pool_sol: u64,
    to: Pubkey,
}

/// The next event for `pool` among the events with `discriminator`.
fn next_pool_event<T: BorshDeserialize>(
    ctx: &mut DecodeContext<'_>,
    discriminator: &[u8; 8],
    instruction: &'static str,
    pool: &Pubkey,
    pool_of: impl Fn(&T) -> [u8; 32],
) -> Result<T, DecodeError> {
    let events: Vec<T> = events_with_discriminator(&ctx.tx.log_messages, discriminator)
        .iter()
        .filter_map(|bytes| decode_prefix::<T>(bytes))
        .filter(|event| Pubkey::new_from_array(pool_of(event)) == *pool)
        .collect();

    let pool_key = pool.to_string();
    let position = ctx.events.next(&ctx.tx.signature, instruction, &pool_key);
    events
        .into_iter()
        .nth(position)
        .ok_or_else(|| DecodeError::EventNotFound(format!("pump amm {} event #{} for {}", instruction, position, pool_key)))
}

pub fn decode(ctx: &mut DecodeContext<'_>, ix: &RawInstruction, _inner: Option<&[RawInstruction]>) -> DecodeResult {
    let Some((discriminator, _)) = split_discriminator(&ix.data) else {
        return Ok(None);
    };

    if discriminator == *BUY {
        decode_swap(ctx, ix, TradeType::Buy)
    } else if discriminator == *SELL {
        decode_swap(ctx, ix, TradeType::Sell)
    } else if discriminator == *CREATE_POOL {
        decode_create_pool(ctx, ix)
    } else {
        Ok(None)
    }
}

fn decode_swap(ctx: &mut DecodeContext<'_>, ix: &RawInstruction, trade_type: TradeType) -> DecodeResult {
    require_accounts(ix, SWAP_MIN_ACCOUNTS, NAME)?;

    let pool = ix.accounts[0];
    let user = ix.accounts[1];
    let base_mint = ix.accounts[3];
    let quote_mint = ix.accounts[4];

    if quote_mint != WSOL_MINT {
        return Err(DecodeError::UnsupportedSwap);
    }

    let fill = if trade_type == TradeType::Buy {
        let event: BuyEvent = next_pool_event(ctx, &BUY_EVENT, "buy", &pool, |e: &BuyEvent| e.pool)?;
        Fill {
            sol: event.quote_amount_in_with_lp_fee,
            tokens: event.base_amount_out,
            pool_tokens: event.pool_base_token_reserves,
            pool_sol: event.pool_quote_token_reserves,
            to: Pubkey::new_from_array(event.user_quote_token_account),
        }
    } else {
        let event: SellEvent = next_pool_event(ctx, &SELL_EVENT, "sell", &pool, |e: &SellEvent| e.pool)?;
        Fill {
            sol: event.quote_amount_out_without_lp_fee,
            tokens: event.base_amount_in,
            pool_tokens: event.pool_base_token_reserves,
            pool_sol: event.pool_quote_token_reserves,
            to: Pubkey::new_from_array(event.user_quote_token_account),
        }
    };

    let mut trade = Trade::new_sol(SwapName::PumpAmm, trade_type);
    trade.pair_addr = pool.to_string();
    trade.maker = user.to_string();
    trade.to = fill.to.to_string();
    trade.token_addr = base_mint.to_string();
    trade.token_account = ix.accounts[7].to_string();

    // Decimals from the pool's or the user's token account, else resolved later
    match ctx.decimals_of(&ix.accounts[7]).or_else(|| ctx.decimals_of(&ix.accounts[5])) {
        Some(decimals) => trade.token_decimals = decimals,
        None => trade.decimals_pending = true,
    }

    trade.raw.base = fill.sol;
    trade.raw.token = fill.tokens;
    trade.raw.base_reserve = fill.pool_sol;
    trade.raw.token_reserve = fill.pool_tokens;
    trade.init_base_token_amount = Decimal::new(PUMP_INIT_SOL_MILLIS, 3);
    trade.init_token_amount = Decimal::from(PUMP_VIRTUAL_INIT_TOKEN_AMOUNT);

    if trade.raw.token == 0 {
        return Err(DecodeError::TokenAmountIsZero);
    }
    trade.rescale();

    let (point, status) = curve_progress(trade.current_token_in_pool_amount);
    trade.pump = Some(PumpCurve { point, status, ..Default::default() });

    let at = |index: usize| ix.accounts[index].to_string();
    trade.pool = Some(PoolInfo::PumpAmm(PumpAmmInfo {
        pool_account: at(0),
        global_config: at(2),
        base_mint: at(3),
        quote_mint: at(4),
        pool_base_token_account: at(7),
        pool_quote_token_account: at(8),
        protocol_fee_recipient: at(9),
        protocol_fee_recipient_token_account: at(10),
        base_token_program: at(11),
        quote_token_program: at(12),
        tx_hash: ctx.tx_hash().to_string(),
    }));

    Ok(Some(trade))
}

/// New pool. The pool's seed amounts are its initial reserves; wrapped SOL
/// becomes the base side.
fn decode_create_pool(ctx: &mut DecodeContext<'_>, ix: &RawInstruction) -> DecodeResult {
    require_accounts(ix, CREATE_POOL_MIN_ACCOUNTS, NAME)?;

    let pool = ix.accounts[0];
    let creator = ix.accounts[2];
    let event: CreatePoolEvent =
        next_pool_event(ctx, &CREATE_POOL_EVENT, "create_pool", &pool, |e: &CreatePoolEvent| e.pool)?;

    let base_mint = Pubkey::new_from_array(event.base_mint);
    let quote_mint = Pubkey::new_from_array(event.quote_mint);

    let (token_mint, token_decimals, sol_amount, token_amount) = if quote_mint == WSOL_MINT {
        (base_mint, event.base_mint_decimals, event.pool_quote_amount, event.pool_base_amount)
    } else if base_mint == WSOL_MINT {
        (quote_mint, event.quote_mint_decimals, event.pool_base_amount, event.pool_quote_amount)
    } else {
        return Err(DecodeError::UnsupportedSwap);
    };

    let mut trade = Trade::new_sol(SwapName::PumpAmm, TradeType::PumpCreatePool);
    trade.pair_addr = pool.to_string();
    trade.maker = creator.to_string();
    trade.to = pool.to_string();
    trade.token_addr = token_mint.to_string();
    trade.token_decimals = token_decimals;

    trade.raw.base_reserve = sol_amount;
    trade.raw.token_reserve = token_amount;
    trade.raw.init_base = sol_amount;
    trade.raw.init_token = token_amount;
    trade.rescale();

    let at = |index: usize| ix.accounts[index].to_string();
    trade.pool = Some(PoolInfo::PumpAmm(PumpAmmInfo {
        pool_account: at(0),
        global_config: at(1),
        base_mint: base_mint.to_string(),
        quote_mint: quote_mint.to_string(),
        pool_base_token_account: at(9),
        pool_quote_token_account: at(10),
        tx_hash: ctx.tx_hash().to_string(),
        ..Default::default()
    }));

    Ok(Some(trade))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::models::fixtures::*;
    use crate::blockchain::models::RawTransaction;
    use crate::constants::PUMP_AMM_PROGRAM;
    use crate::decoder::events::PROGRAM_DATA_PREFIX;
    use crate::decoder::{decode_transaction, snapshot, EventCounter, TokenAccountMap};
    use crate::models::trade::PumpStatus;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use rust_decimal_macros::dec;

    const MINT: u8 = 95;

    fn buy_event_log(pool: Pubkey, tokens_out: u64, sol_in: u64, pool_tokens: u64, pool_sol: u64) -> String {
        let mut bytes = BUY_EVENT.to_vec();
        bytes.extend_from_slice(&0i64.to_le_bytes());
        let amounts = [tokens_out, sol_in, 0, 0, pool_tokens, pool_sol, sol_in, 0, 0, 0, 0, sol_in, sol_in];
        for value in amounts {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes.extend_from_slice(pool.as_ref());
        for seed in [1u8, 2, 3, 4, 5] {
            bytes.extend_from_slice(&[seed; 32]);
        }
        format!("{}{}", PROGRAM_DATA_PREFIX, STANDARD.encode(bytes))
    }

    fn swap_accounts(pool: Pubkey, quote_mint: Pubkey, pool_token_account: Pubkey) -> Vec<Pubkey> {
        let mut accounts: Vec<Pubkey> = (0..17).map(|i| key(180 + i)).collect();
        accounts[0] = pool;
        accounts[1] = key(1);
        accounts[3] = key(MINT);
        accounts[4] = quote_mint;
        accounts[7] = pool_token_account;
        accounts
    }

    fn decode_tx(tx: &RawTransaction) -> Vec<Trade> {
        let mut accounts = TokenAccountMap::new();
        snapshot(&mut accounts, tx);
        let mut events = EventCounter::new();
        decode_transaction(tx, 0, &accounts, dec!(200), &mut events, false).unwrap()
    }

    #[test]
    fn test_events_are_matched_per_pool() {
        let pool_a = key(60);
        let pool_b = key(61);
        let tx = TxBuilder::new("amm-buys")
            .signer(key(1))
            .balance(key(30), key(MINT), pool_a, 6, Some(300_000_000_000_000), Some(290_000_000_000_000))
            .instruction(PUMP_AMM_PROGRAM, swap_accounts(pool_a, WSOL_MINT, key(30)), BUY.to_vec())
            .instruction(PUMP_AMM_PROGRAM, swap_accounts(pool_b, WSOL_MINT, key(31)), BUY.to_vec())
            .log(buy_event_log(pool_b, 5_000_000, 1_000_000_000, 100_000_000_000_000, 80_000_000_000))
            .log(buy_event_log(pool_a, 10_000_000, 2_000_000_000, 200_000_000_000_000, 90_000_000_000))
            .build();

        let trades = decode_tx(&tx);
        assert_eq!(trades.len(), 2);

        assert_eq!(trades[0].pair_addr, pool_a.to_string());
        assert_eq!(trades[0].token_amount, dec!(10));
        assert_eq!(trades[0].base_token_amount, dec!(2));
        assert_eq!(trades[0].current_token_in_pool_amount, dec!(200000000));
        let curve = trades[0].pump.as_ref().unwrap();
        assert_eq!(curve.status, PumpStatus::Trading);
        assert!(curve.point > dec!(0.77) && curve.point < dec!(0.78));

        // Second pool has no decimals in the snapshot
        assert_eq!(trades[1].pair_addr, pool_b.to_string());
        assert!(trades[1].decimals_pending);
    }

    #[test]
    fn test_non_wsol_quote_is_unsupported() {
        let tx = TxBuilder::new("amm-usdc")
            .signer(key(1))
            .instruction(PUMP_AMM_PROGRAM, swap_accounts(key(60), key(99), key(30)), BUY.to_vec())
            .build();
        assert!(decode_tx(&tx).is_empty());
    }
}
