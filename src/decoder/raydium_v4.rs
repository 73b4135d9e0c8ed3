//! Raydium AMM v4 (constant product, Serum/OpenBook backed).

use crate::blockchain::models::RawInstruction;
use crate::constants::WSOL_MINT;
use crate::decoder::{
    account_at, apply_legs, apply_vault_reserves, finish_swap, transfer_swap, DecodeContext, DecodeError,
    DecodeResult,
};
use crate::decoder::events::decode_prefix;
use crate::models::pool::{PoolInfo, RaydiumPool};
use crate::models::trade::{SwapName, Trade, TradeType};
use borsh::{BorshDeserialize, BorshSerialize};

const NAME: &str = "RaydiumV4";

const INITIALIZE2: u8 = 1;
const SWAP_BASE_IN: u8 = 9;
const SWAP_BASE_OUT: u8 = 11;

const INITIALIZE2_ACCOUNTS: usize = 21;

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitializeInstruction2 {
    pub nonce: u8,
    pub open_time: u64,
    pub init_pc_amount: u64,
    pub init_coin_amount: u64,
}

pub fn decode(ctx: &mut DecodeContext<'_>, ix: &RawInstruction, inner: Option<&[RawInstruction]>) -> DecodeResult {
    match ix.data.first() {
        Some(&SWAP_BASE_IN) | Some(&SWAP_BASE_OUT) => decode_swap(ctx, ix, inner),
        Some(&INITIALIZE2) => decode_initialize2(ctx, ix),
        _ => Ok(None),
    }
}

fn decode_swap(ctx: &mut DecodeContext<'_>, ix: &RawInstruction, inner: Option<&[RawInstruction]>) -> DecodeResult {
    let n = ix.accounts.len();
    if n != 17 && n != 18 {
        return Err(DecodeError::AccountCountMismatch { program: NAME, expected: 18, actual: n });
    }

    // The 17-account form omits the target orders account
    let shift = n - 17;
    let at = |index: usize| ix.accounts[index].to_string();

    let from = ix.accounts[n - 3];
    let to = ix.accounts[n - 2];
    let owner = ix.accounts[n - 1];
    let pool_coin = ix.accounts[4 + shift];
    let pool_pc = ix.accounts[5 + shift];

    let legs = transfer_swap(ctx, inner, &from, &to)?;

    let mut trade = Trade::new_sol(SwapName::RaydiumV4, TradeType::Buy);
    trade.pair_addr = at(1);
    trade.maker = owner.to_string();
    apply_legs(&mut trade, &legs);
    apply_vault_reserves(ctx, &mut trade, &legs.token.mint, &[pool_coin, pool_pc]);

    let (base_mint, quote_mint) = match (ctx.account(&pool_coin), ctx.account(&pool_pc)) {
        (Some(coin), Some(pc)) => (coin.mint.to_string(), pc.mint.to_string()),
        _ => (String::new(), String::new()),
    };

    trade.pool = Some(PoolInfo::RaydiumV4(RaydiumPool {
        amm_id: at(1),
        amm_authority: at(2),
        amm_open_orders: at(3),
        amm_target_orders: if shift == 1 { at(4) } else { String::new() },
        pool_coin_token_account: pool_coin.to_string(),
        pool_pc_token_account: pool_pc.to_string(),
        serum_program_id: at(6 + shift),
        serum_market: at(7 + shift),
        serum_bids: at(8 + shift),
        serum_asks: at(9 + shift),
        serum_event_queue: at(10 + shift),
        serum_coin_vault_account: at(11 + shift),
        serum_pc_vault_account: at(12 + shift),
        serum_vault_signer: at(13 + shift),
        base_mint,
        quote_mint,
        tx_hash: ctx.tx_hash().to_string(),
    }));

    finish_swap(trade)
}

/// Pool creation. The seed amounts become the pair's initial reserves.
fn decode_initialize2(ctx: &mut DecodeContext<'_>, ix: &RawInstruction) -> DecodeResult {
    if ix.accounts.len() != INITIALIZE2_ACCOUNTS {
        return Err(DecodeError::AccountCountMismatch {
            program: NAME,
            expected: INITIALIZE2_ACCOUNTS,
            actual: ix.accounts.len(),
        });
    }

    let args: InitializeInstruction2 = decode_prefix(&ix.data[1..])
        .ok_or_else(|| DecodeError::invalid("initialize2 arguments"))?;

    let pair = account_at(ix, 4, NAME)?;
    let coin_mint = account_at(ix, 8, NAME)?;
    let pc_mint = account_at(ix, 9, NAME)?;
    let pool_coin = account_at(ix, 10, NAME)?;
    let pool_pc = account_at(ix, 11, NAME)?;
    let maker = account_at(ix, 17, NAME)?;

    // Wrapped SOL is always the base side
    let (token_mint, token_vault, base_amount, token_amount) = if coin_mint == WSOL_MINT {
        (pc_mint, pool_pc, args.init_coin_amount, args.init_pc_amount)
    } else if pc_mint == WSOL_MINT {
        (coin_mint, pool_coin, args.init_pc_amount, args.init_coin_amount)
    } else {
        return Err(DecodeError::UnsupportedSwap);
    };

    let mut trade = Trade::new_sol(SwapName::RaydiumV4, TradeType::AddPosition);
    trade.pair_addr = pair.to_string();
    trade.maker = maker.to_string();
    trade.to = pair.to_string();
    trade.token_addr = token_mint.to_string();
    match ctx.decimals_of(&token_vault) {
        Some(decimals) => trade.token_decimals = decimals,
        None => trade.decimals_pending = true,
    }

    trade.raw.base = base_amount;
    trade.raw.token = token_amount;
    trade.raw.init_base = base_amount;
    trade.raw.init_token = token_amount;
    apply_vault_reserves(ctx, &mut trade, &token_mint, &[pool_coin, pool_pc]);

    let at = |index: usize| ix.accounts[index].to_string();
    trade.pool = Some(PoolInfo::RaydiumV4(RaydiumPool {
        amm_id: pair.to_string(),
        amm_authority: at(5),
        amm_open_orders: at(6),
        amm_target_orders: at(13),
        pool_coin_token_account: pool_coin.to_string(),
        pool_pc_token_account: pool_pc.to_string(),
        serum_program_id: at(15),
        serum_market: at(16),
        base_mint: coin_mint.to_string(),
        quote_mint: pc_mint.to_string(),
        tx_hash: ctx.tx_hash().to_string(),
        ..Default::default()
    }));

    trade.rescale();
    Ok(Some(trade))
}
