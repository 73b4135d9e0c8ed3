//! Instruction decoders. Each supported DEX program gets a module exposing
//! `decode(ctx, ix, inner)`, dispatched by program id through [`Dex`].

pub mod amm_config;
pub mod clmm;
pub mod cpmm;
pub mod enrich;
pub mod error;
pub mod events;
pub mod oracle;
pub mod pump;
pub mod pump_amm;
pub mod raydium_v4;
pub mod snapshot;
pub mod token;
pub mod transfer;

pub use error::DecodeError;
pub use events::EventCounter;
pub use snapshot::{snapshot, TokenAccount, TokenAccountMap};

use crate::blockchain::models::{RawBlock, RawInstruction, RawTransaction};
use crate::constants::{
    PUMP_AMM_PROGRAM, PUMP_CREATE_PRICE_FACTOR_E11, PUMP_FUN_PROGRAM, RAYDIUM_CLMM_PROGRAM,
    RAYDIUM_CPMM_PROGRAM, RAYDIUM_V4_PROGRAM, TOKEN_2022_PROGRAM, TOKEN_PROGRAM, WSOL_MINT,
};
use crate::decoder::transfer::{find_swap_legs, is_swap_transfer, vault_transfer_amount};
use crate::models::trade::{Trade, TradeType};
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

pub type DecodeResult = Result<Option<Trade>, DecodeError>;

/// Everything a decoder may read while decoding one instruction.
pub struct DecodeContext<'a> {
    pub tx: &'a RawTransaction,
    pub accounts: &'a TokenAccountMap,
    pub tx_index: u32,
    pub sol_price: Decimal,
    pub events: &'a mut EventCounter,
}

impl DecodeContext<'_> {
    pub fn tx_hash(&self) -> &str {
        &self.tx.signature
    }

    pub fn account(&self, address: &Pubkey) -> Option<&TokenAccount> {
        self.accounts.get(address)
    }

    /// Decimals recorded for a token account, `None` while unknown.
    pub fn decimals_of(&self, address: &Pubkey) -> Option<u8> {
        self.account(address)
            .map(|account| account.decimals)
            .filter(|decimals| *decimals > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dex {
    RaydiumV4,
    Cpmm,
    Clmm,
    PumpFun,
    PumpAmm,
    Token,
}

impl Dex {
    pub fn from_program(program_id: &Pubkey) -> Option<Self> {
        match *program_id {
            RAYDIUM_V4_PROGRAM => Some(Dex::RaydiumV4),
            RAYDIUM_CPMM_PROGRAM => Some(Dex::Cpmm),
            RAYDIUM_CLMM_PROGRAM => Some(Dex::Clmm),
            PUMP_FUN_PROGRAM => Some(Dex::PumpFun),
            PUMP_AMM_PROGRAM => Some(Dex::PumpAmm),
            TOKEN_PROGRAM | TOKEN_2022_PROGRAM => Some(Dex::Token),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dex::RaydiumV4 => "raydium_v4",
            Dex::Cpmm => "raydium_cpmm",
            Dex::Clmm => "raydium_clmm",
            Dex::PumpFun => "pump_fun",
            Dex::PumpAmm => "pump_amm",
            Dex::Token => "token",
        }
    }

    pub fn decode(
        &self,
        ctx: &mut DecodeContext<'_>,
        ix: &RawInstruction,
        inner: Option<&[RawInstruction]>,
    ) -> DecodeResult {
        match self {
            Dex::RaydiumV4 => raydium_v4::decode(ctx, ix, inner),
            Dex::Cpmm => cpmm::decode(ctx, ix, inner),
            Dex::Clmm => clmm::decode(ctx, ix, inner),
            Dex::PumpFun => pump::decode(ctx, ix, inner),
            Dex::PumpAmm => pump_amm::decode(ctx, ix, inner),
            Dex::Token => token::decode(ctx, ix, inner),
        }
    }
}

/// Dispatch an instruction by program id.
pub fn dispatch(ctx: &mut DecodeContext<'_>, ix: &RawInstruction, inner: Option<&[RawInstruction]>) -> DecodeResult {
    let dex = Dex::from_program(&ix.program_id).ok_or(DecodeError::UnknownProgram(ix.program_id))?;
    dex.decode(ctx, ix, inner)
}

/// Seed prices once a trade's amounts are final.
pub fn settle_prices(trade: &mut Trade, sol_price: Decimal) {
    match trade.trade_type {
        TradeType::PumpCreate => {
            trade.base_token_price_usd = sol_price;
            trade.total_usd = Decimal::ZERO;
            trade.token_price_usd = sol_price
                .checked_mul(Decimal::new(PUMP_CREATE_PRICE_FACTOR_E11, 11))
                .unwrap_or(Decimal::ZERO);
        }
        TradeType::TokenMint | TradeType::TokenBurn => {
            trade.base_token_price_usd = sol_price;
        }
        _ => {
            trade.apply_prices(sol_price);
        }
    }
}

fn finalize(ctx: &DecodeContext<'_>, trade: &mut Trade, log_index: u32) {
    trade.tx_hash = ctx.tx.signature.clone();
    trade.tx_index = ctx.tx_index;
    trade.log_index = log_index;
    settle_prices(trade, ctx.sol_price);
}

/// Decode every supported instruction of one transaction. Outer
/// instructions are decoded with their inner group; with `decode_inner`
/// the CPI-invoked instructions are decoded too, each with the two
/// instructions that follow it.
pub fn decode_transaction(
    tx: &RawTransaction,
    tx_index: u32,
    accounts: &TokenAccountMap,
    sol_price: Decimal,
    events: &mut EventCounter,
    decode_inner: bool,
) -> Result<Vec<Trade>, DecodeError> {
    if tx.failed {
        return Ok(Vec::new());
    }
    if tx.log_messages.is_empty() {
        return Err(DecodeError::VoteTransaction);
    }

    let mut ctx = DecodeContext { tx, accounts, tx_index, sol_price, events };
    let mut trades = Vec::new();

    for (index, ix) in tx.instructions.iter().enumerate() {
        collect(&mut ctx, ix, tx.inner_group(index), &mut trades);

        if !decode_inner {
            continue;
        }
        if let Some(group) = tx.inner_group(index) {
            for (position, nested) in group.iter().enumerate() {
                let end = (position + 3).min(group.len());
                collect(&mut ctx, nested, group.get(position + 1..end), &mut trades);
            }
        }
    }

    Ok(trades)
}

fn collect(ctx: &mut DecodeContext<'_>, ix: &RawInstruction, inner: Option<&[RawInstruction]>, trades: &mut Vec<Trade>) {
    let Some(dex) = Dex::from_program(&ix.program_id) else {
        return;
    };

    match dex.decode(ctx, ix, inner) {
        Ok(Some(mut trade)) => {
            finalize(ctx, &mut trade, trades.len() as u32);
            trades.push(trade);
        }
        Ok(None) => {}
        Err(err) => error::report(dex.name(), ctx.tx_hash(), &err),
    }
}

/// Trades of a block plus the token accounts seen while decoding it.
#[derive(Debug, Default)]
pub struct DecodedBlock {
    pub trades: Vec<Trade>,
    pub accounts: TokenAccountMap,
}

/// Decode a whole block in transaction order. The token-account map grows
/// transaction by transaction so a decoder only sees accounts known up to
/// and including its own transaction.
pub fn decode_block(block: &RawBlock, sol_price: Decimal, decode_inner: bool) -> DecodedBlock {
    let mut accounts = TokenAccountMap::new();
    let mut events = EventCounter::new();
    let mut trades = Vec::new();

    for (index, tx) in block.transactions.iter().enumerate() {
        if tx.failed {
            continue;
        }
        snapshot(&mut accounts, tx);

        match decode_transaction(tx, index as u32, &accounts, sol_price, &mut events, decode_inner) {
            Ok(decoded) => trades.extend(decoded),
            Err(DecodeError::VoteTransaction) => {}
            Err(err) => debug!("Slot {} transaction {} skipped: {}", block.slot, index, err),
        }
    }

    enrich::fill_block_fields(&mut trades, block);
    enrich::mark_sandwiches(&mut trades);

    DecodedBlock { trades, accounts }
}

// Helpers shared by the DEX decoders

/// Account at `index`, or an account-count error naming the program.
pub(crate) fn account_at(ix: &RawInstruction, index: usize, program: &'static str) -> Result<Pubkey, DecodeError> {
    ix.accounts.get(index).copied().ok_or(DecodeError::AccountCountMismatch {
        program,
        expected: index + 1,
        actual: ix.accounts.len(),
    })
}

pub(crate) fn require_accounts(ix: &RawInstruction, min: usize, program: &'static str) -> Result<(), DecodeError> {
    if ix.accounts.len() < min {
        return Err(DecodeError::AccountCountMismatch { program, expected: min, actual: ix.accounts.len() });
    }
    Ok(())
}

/// Both legs of a user/pool swap resolved against the snapshot.
#[derive(Debug, Clone)]
pub(crate) struct SwapLegs {
    pub trade_type: TradeType,
    pub base: TokenAccount,
    pub token: TokenAccount,
    pub base_amount: u64,
    pub token_amount: u64,
    pub to: Option<Pubkey>,
}

/// Orient a swap between the user's `from` and `to` token accounts. Wrapped
/// SOL going in is a buy, wrapped SOL coming out is a sell.
pub(crate) fn orient_swap(
    ctx: &DecodeContext<'_>,
    from: &Pubkey,
    to: &Pubkey,
    from_amount: u64,
    to_amount: u64,
) -> Result<SwapLegs, DecodeError> {
    let from_info = ctx
        .account(from)
        .ok_or_else(|| DecodeError::InvalidData(format!("source account {} not in snapshot", from)))?;
    let to_info = ctx
        .account(to)
        .ok_or_else(|| DecodeError::InvalidData(format!("destination account {} not in snapshot", to)))?;

    if from_info.mint == WSOL_MINT {
        Ok(SwapLegs {
            trade_type: TradeType::Buy,
            base: from_info.clone(),
            token: to_info.clone(),
            base_amount: from_amount,
            token_amount: to_amount,
            to: to_info.owner,
        })
    } else if to_info.mint == WSOL_MINT {
        Ok(SwapLegs {
            trade_type: TradeType::Sell,
            base: to_info.clone(),
            token: from_info.clone(),
            base_amount: to_amount,
            token_amount: from_amount,
            to: from_info.owner,
        })
    } else {
        Err(DecodeError::UnsupportedSwap)
    }
}

/// Swap legs taken from the SPL transfers of an inner group.
pub(crate) fn transfer_swap(
    ctx: &DecodeContext<'_>,
    inner: Option<&[RawInstruction]>,
    from: &Pubkey,
    to: &Pubkey,
) -> Result<SwapLegs, DecodeError> {
    let group = inner.ok_or_else(|| DecodeError::InvalidData("swap without inner instructions".to_string()))?;

    let (from_leg, to_leg) = find_swap_legs(group, from, to);
    let from_leg = from_leg.ok_or_else(|| DecodeError::InvalidData("source transfer not found".to_string()))?;
    let to_leg = to_leg.ok_or_else(|| DecodeError::InvalidData("destination transfer not found".to_string()))?;

    if !is_swap_transfer(&from_leg, &to_leg, ctx.accounts) {
        return Err(DecodeError::InvalidData("transfers are not legs of one swap".to_string()));
    }

    orient_swap(ctx, from, to, from_leg.amount, to_leg.amount)
}

/// Copy oriented legs into a trade. Unknown token decimals leave the trade
/// pending for the enrichment pass.
pub(crate) fn apply_legs(trade: &mut Trade, legs: &SwapLegs) {
    trade.trade_type = legs.trade_type;
    trade.token_addr = legs.token.mint.to_string();
    trade.token_account = legs.token.address.to_string();
    trade.to = legs.to.map(|owner| owner.to_string()).unwrap_or_default();
    trade.raw.base = legs.base_amount;
    trade.raw.token = legs.token_amount;

    if legs.token.decimals == 0 {
        trade.decimals_pending = true;
    } else {
        trade.token_decimals = legs.token.decimals;
    }
}

/// Post balances of the pool vaults as in-pool reserves.
pub(crate) fn apply_vault_reserves(ctx: &DecodeContext<'_>, trade: &mut Trade, token_mint: &Pubkey, vaults: &[Pubkey]) {
    for vault in vaults {
        let Some(account) = ctx.account(vault) else {
            continue;
        };
        if account.mint == WSOL_MINT {
            trade.raw.base_reserve = account.post;
        } else if account.mint == *token_mint {
            trade.raw.token_reserve = account.post;
        }
    }
}

/// Rescale a swap and reject it when no tokens moved.
pub(crate) fn finish_swap(mut trade: Trade) -> DecodeResult {
    if trade.raw.token == 0 {
        return Err(DecodeError::TokenAmountIsZero);
    }
    trade.rescale();
    Ok(Some(trade))
}

/// Accounts of a two-vault liquidity instruction.
pub(crate) struct VaultPair {
    pub vaults: [Pubkey; 2],
    /// Vault mints when the instruction names them directly.
    pub mints: Option<[Pubkey; 2]>,
}

/// Deposit or withdrawal across two vaults: amounts from the inner transfers
/// credited to (`into_vault`) or debited from the vaults, reserves from
/// their post balances. Wrapped SOL is the base side.
pub(crate) fn vault_liquidity(
    ctx: &DecodeContext<'_>,
    trade: &mut Trade,
    pair: &VaultPair,
    inner: Option<&[RawInstruction]>,
    into_vault: bool,
) -> Result<(), DecodeError> {
    let mints = match pair.mints {
        Some(mints) => mints,
        None => {
            let mint = |vault: &Pubkey| {
                ctx.account(vault)
                    .map(|account| account.mint)
                    .ok_or_else(|| DecodeError::InvalidData(format!("vault {} not in snapshot", vault)))
            };
            [mint(&pair.vaults[0])?, mint(&pair.vaults[1])?]
        }
    };

    let (base, token) = if mints[0] == WSOL_MINT {
        (0, 1)
    } else if mints[1] == WSOL_MINT {
        (1, 0)
    } else {
        return Err(DecodeError::UnsupportedSwap);
    };

    trade.token_addr = mints[token].to_string();
    match ctx.decimals_of(&pair.vaults[token]) {
        Some(decimals) => trade.token_decimals = decimals,
        None => trade.decimals_pending = true,
    }

    let group = inner.unwrap_or_default();
    trade.raw.base = vault_transfer_amount(group, &pair.vaults[base], into_vault);
    trade.raw.token = vault_transfer_amount(group, &pair.vaults[token], into_vault);
    apply_vault_reserves(ctx, trade, &mints[token], &pair.vaults);

    trade.rescale();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::models::fixtures::*;
    use crate::models::trade::SwapName;
    use rust_decimal_macros::dec;

    #[test]
    fn test_dispatch_unknown_program() {
        let tx = TxBuilder::new("sig").build();
        let accounts = TokenAccountMap::new();
        let mut events = EventCounter::new();
        let mut ctx = DecodeContext { tx: &tx, accounts: &accounts, tx_index: 0, sol_price: dec!(200), events: &mut events };

        let ix = RawInstruction { program_id: key(77), accounts: vec![], data: vec![] };
        assert!(matches!(dispatch(&mut ctx, &ix, None), Err(DecodeError::UnknownProgram(_))));
        assert_eq!(Dex::from_program(&TOKEN_2022_PROGRAM), Some(Dex::Token));
    }

    #[test]
    fn test_vote_and_failed_transactions() {
        let accounts = TokenAccountMap::new();
        let mut events = EventCounter::new();

        let vote = TxBuilder::new("vote").no_logs().build();
        assert!(matches!(
            decode_transaction(&vote, 0, &accounts, dec!(1), &mut events, false),
            Err(DecodeError::VoteTransaction)
        ));

        let failed = TxBuilder::new("failed").no_logs().failed().build();
        assert!(decode_transaction(&failed, 0, &accounts, dec!(1), &mut events, false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_settle_prices_pump_create_seed() {
        let mut trade = Trade::new_sol(SwapName::PumpFun, TradeType::PumpCreate);
        settle_prices(&mut trade, dec!(200));
        assert_eq!(trade.base_token_price_usd, dec!(200));
        assert_eq!(trade.token_price_usd, dec!(0.00000155));
        assert_eq!(trade.total_usd, Decimal::ZERO);
    }

    #[test]
    fn test_account_at_reports_count() {
        let ix = RawInstruction { program_id: key(1), accounts: vec![key(2)], data: vec![] };
        assert_eq!(account_at(&ix, 0, "test").unwrap(), key(2));
        match account_at(&ix, 4, "test") {
            Err(DecodeError::AccountCountMismatch { expected, actual, .. }) => assert_eq!((expected, actual), (5, 1)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
