//! pump.fun bonding curve.

use crate::blockchain::models::RawInstruction;
use crate::constants::{
    PUMP_INIT_SOL_MILLIS, PUMP_INIT_TOKEN_AMOUNT, PUMP_MIGRATING_THRESHOLD_MILLIS, PUMP_SOL_RESERVES_DIFF,
    PUMP_TOKEN_RESERVES_DIFF, PUMP_VIRTUAL_INIT_SOL_AMOUNT, PUMP_VIRTUAL_INIT_TOKEN_AMOUNT, SOL_DECIMALS,
};
use crate::decoder::events::{decode_prefix, event_discriminator, events_with_discriminator, split_discriminator};
use crate::decoder::{account_at, require_accounts, DecodeContext, DecodeError, DecodeResult};
use crate::models::amount::{checked_ratio, raw_to_decimal};
use crate::models::trade::{PumpCurve, PumpStatus, SwapName, Trade, TradeType};
use borsh::BorshDeserialize;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;

const NAME: &str = "PumpFun";

const BUY: u64 = 0xeaebda01123d0666;
const SELL: u64 = 0xad837f01a485e633;
const SYNC: u64 = 0x1d9acb512ea545e4;
const CREATE: u64 = 0x77071c0528c81e18;

const SWAP_MIN_ACCOUNTS: usize = 12;
const CREATE_ACCOUNTS: usize = 14;

/// `TradeEvent` as logged after each buy and sell. Later program versions
/// append fields, which are ignored.
#[derive(BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct TradeEvent {
    pub mint: [u8; 32],
    pub sol_amount: u64,
    pub token_amount: u64,
    pub is_buy: bool,
    pub user: [u8; 32],
    pub timestamp: i64,
    pub virtual_sol_reserves: u64,
    pub virtual_token_reserves: u64,
}

/// Progress along the curve from the tokens still in the pool. At 0.999 the
/// curve is reported complete and migrating.
pub fn curve_progress(current_token_in_pool: Decimal) -> (Decimal, PumpStatus) {
    if current_token_in_pool <= Decimal::ZERO {
        return (Decimal::ONE, PumpStatus::Migrating);
    }

    let sold = checked_ratio(current_token_in_pool, Decimal::from(PUMP_INIT_TOKEN_AMOUNT)).unwrap_or(Decimal::ZERO);
    let point = (Decimal::ONE - sold).clamp(Decimal::ZERO, Decimal::ONE);

    if point >= Decimal::new(PUMP_MIGRATING_THRESHOLD_MILLIS, 3) {
        (Decimal::ONE, PumpStatus::Migrating)
    } else {
        (point, PumpStatus::Trading)
    }
}

pub fn decode(ctx: &mut DecodeContext<'_>, ix: &RawInstruction, _inner: Option<&[RawInstruction]>) -> DecodeResult {
    let Some((discriminator, _)) = split_discriminator(&ix.data) else {
        return Ok(None);
    };

    match u64::from_le_bytes(discriminator) {
        BUY | SELL => decode_trade(ctx, ix),
        CREATE => decode_create(ctx, ix),
        SYNC => Ok(None),
        _ => Ok(None),
    }
}

fn decode_trade(ctx: &mut DecodeContext<'_>, ix: &RawInstruction) -> DecodeResult {
    require_accounts(ix, SWAP_MIN_ACCOUNTS, NAME)?;

    let pair = ix.accounts[3];
    let to = ix.accounts[4];
    let token_account = ix.accounts[5];
    let maker = ix.accounts[6];

    let token_info = ctx
        .account(&token_account)
        .ok_or_else(|| DecodeError::InvalidData(format!("bonding curve account {} not in snapshot", token_account)))?;
    let token_decimals = token_info.decimals;

    let events = events_with_discriminator(&ctx.tx.log_messages, &event_discriminator("TradeEvent"));
    let position = ctx.events.next(&ctx.tx.signature, "pump_trade", "");
    let event: TradeEvent = events
        .get(position)
        .and_then(|bytes| decode_prefix(bytes))
        .ok_or_else(|| DecodeError::EventNotFound(format!("pump.fun trade event #{}", position)))?;

    let trade_type = if event.is_buy { TradeType::Buy } else { TradeType::Sell };
    let mut trade = Trade::new_sol(SwapName::PumpFun, trade_type);
    trade.pair_addr = pair.to_string();
    trade.maker = maker.to_string();
    trade.to = to.to_string();
    trade.token_addr = Pubkey::new_from_array(event.mint).to_string();
    trade.token_account = token_account.to_string();

    if token_decimals == 0 {
        trade.decimals_pending = true;
    } else {
        trade.token_decimals = token_decimals;
    }

    trade.raw.base = event.sol_amount;
    trade.raw.token = event.token_amount;
    trade.raw.base_reserve = event.virtual_sol_reserves.saturating_sub(PUMP_SOL_RESERVES_DIFF);
    trade.raw.token_reserve = event.virtual_token_reserves.saturating_sub(PUMP_TOKEN_RESERVES_DIFF);
    trade.init_base_token_amount = Decimal::new(PUMP_INIT_SOL_MILLIS, 3);
    trade.init_token_amount = Decimal::from(PUMP_VIRTUAL_INIT_TOKEN_AMOUNT);

    if trade.raw.token == 0 {
        return Err(DecodeError::TokenAmountIsZero);
    }
    trade.rescale();

    let (point, status) = curve_progress(trade.current_token_in_pool_amount);
    trade.pump = Some(PumpCurve {
        point,
        status,
        virtual_base_reserves: raw_to_decimal(event.virtual_sol_reserves, SOL_DECIMALS),
        virtual_token_reserves: raw_to_decimal(event.virtual_token_reserves, trade.token_decimals),
    });

    Ok(Some(trade))
}

/// Mint of a new curve. Emitted as a synthetic trade holding the curve's
/// starting reserves.
fn decode_create(ctx: &mut DecodeContext<'_>, ix: &RawInstruction) -> DecodeResult {
    if ix.accounts.len() != CREATE_ACCOUNTS {
        return Err(DecodeError::AccountCountMismatch {
            program: NAME,
            expected: CREATE_ACCOUNTS,
            actual: ix.accounts.len(),
        });
    }

    let mint = account_at(ix, 0, NAME)?;
    let pair = account_at(ix, 2, NAME)?;
    let curve_token_account = account_at(ix, 3, NAME)?;
    let maker = account_at(ix, 7, NAME)?;

    let decimals = ctx
        .decimals_of(&curve_token_account)
        .ok_or_else(|| DecodeError::InvalidData(format!("bonding curve account {} not in snapshot", curve_token_account)))?;

    let init_base = Decimal::new(PUMP_INIT_SOL_MILLIS, 3);
    let init_token = Decimal::from(PUMP_VIRTUAL_INIT_TOKEN_AMOUNT);

    let mut trade = Trade::new_sol(SwapName::PumpFun, TradeType::PumpCreate);
    trade.pair_addr = pair.to_string();
    trade.maker = maker.to_string();
    trade.to = pair.to_string();
    trade.token_addr = mint.to_string();
    trade.token_decimals = decimals;
    trade.token_account = curve_token_account.to_string();
    trade.init_base_token_amount = init_base;
    trade.init_token_amount = init_token;
    trade.current_base_token_in_pool_amount = init_base;
    trade.current_token_in_pool_amount = init_token;
    trade.pump = Some(PumpCurve {
        point: Decimal::ZERO,
        status: PumpStatus::Create,
        virtual_base_reserves: Decimal::from(PUMP_VIRTUAL_INIT_SOL_AMOUNT),
        virtual_token_reserves: init_token,
    });

    Ok(Some(trade))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blockchain::models::fixtures::*;
    use crate::blockchain::models::RawTransaction;
    use crate::constants::PUMP_FUN_PROGRAM;
    use crate::decoder::events::PROGRAM_DATA_PREFIX;
    use crate::decoder::{decode_transaction, snapshot, EventCounter, TokenAccountMap};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use rust_decimal_macros::dec;

    pub const MINT: u8 = 70;

    pub fn trade_event_log(is_buy: bool, sol: u64, tokens: u64, virtual_sol: u64, virtual_token: u64) -> String {
        let mut bytes = event_discriminator("TradeEvent").to_vec();
        bytes.extend_from_slice(&[MINT; 32]);
        bytes.extend_from_slice(&sol.to_le_bytes());
        bytes.extend_from_slice(&tokens.to_le_bytes());
        bytes.push(is_buy as u8);
        bytes.extend_from_slice(&[1u8; 32]);
        bytes.extend_from_slice(&1_700_000_000i64.to_le_bytes());
        bytes.extend_from_slice(&virtual_sol.to_le_bytes());
        bytes.extend_from_slice(&virtual_token.to_le_bytes());
        format!("{}{}", PROGRAM_DATA_PREFIX, STANDARD.encode(bytes))
    }

    fn trade_accounts(maker: Pubkey) -> Vec<Pubkey> {
        let mut accounts: Vec<Pubkey> = (0..12).map(|i| key(120 + i)).collect();
        accounts[2] = key(MINT);
        accounts[3] = key(40);
        accounts[4] = key(41);
        accounts[5] = key(42);
        accounts[6] = maker;
        accounts
    }

    /// Two buys by `maker` on one curve, with their events in log order.
    pub fn two_buys_tx(maker: Pubkey) -> RawTransaction {
        TxBuilder::new("pump-buys")
            .signer(maker)
            .balance(key(42), key(MINT), key(40), 6, Some(800_000_000_000_000), Some(780_000_000_000_000))
            .instruction(PUMP_FUN_PROGRAM, trade_accounts(maker), BUY.to_le_bytes().to_vec())
            .instruction(PUMP_FUN_PROGRAM, trade_accounts(maker), BUY.to_le_bytes().to_vec())
            .log(trade_event_log(true, 1_000_000_000, 10_000_000_000_000, 31_000_000_000, 1_063_000_000_000_000))
            .log(trade_event_log(true, 1_000_000_000, 10_000_000_000_000, 32_000_000_000, 1_053_000_000_000_000))
            .build()
    }

    fn decode_tx(tx: &RawTransaction) -> Vec<Trade> {
        let mut accounts = TokenAccountMap::new();
        snapshot(&mut accounts, tx);
        let mut events = EventCounter::new();
        decode_transaction(tx, 0, &accounts, dec!(200), &mut events, false).unwrap()
    }

    #[test]
    fn test_curve_progress_bounds() {
        assert_eq!(curve_progress(dec!(873000000)), (Decimal::ZERO, PumpStatus::Trading));
        assert_eq!(curve_progress(dec!(436500000)), (dec!(0.5), PumpStatus::Trading));
        assert_eq!(curve_progress(dec!(100000)), (Decimal::ONE, PumpStatus::Migrating));
        assert_eq!(curve_progress(Decimal::ZERO), (Decimal::ONE, PumpStatus::Migrating));
        assert_eq!(curve_progress(dec!(900000000)).0, Decimal::ZERO);
    }

    #[test]
    fn test_buys_consume_events_in_order() {
        let trades = decode_tx(&two_buys_tx(key(1)));
        assert_eq!(trades.len(), 2);

        let first = trades[0].pump.as_ref().unwrap();
        let second = trades[1].pump.as_ref().unwrap();
        assert_eq!(trades[0].current_token_in_pool_amount, dec!(783100000));
        assert_eq!(trades[1].current_token_in_pool_amount, dec!(773100000));
        assert!(second.point >= first.point);
        assert_eq!(first.status, PumpStatus::Trading);
        assert_eq!(trades[0].current_base_token_in_pool_amount, dec!(1));
        assert_eq!(trades[1].current_base_token_in_pool_amount, dec!(2));

        assert_eq!(trades[0].token_amount, dec!(10000000));
        assert_eq!(trades[0].total_usd, dec!(200));
        assert_eq!(trades[0].token_price_usd, dec!(0.00002));
        assert_eq!(trades[0].log_index, 0);
        assert_eq!(trades[1].log_index, 1);
    }

    #[test]
    fn test_missing_event_drops_the_trade() {
        let mut tx = two_buys_tx(key(1));
        tx.log_messages.pop();
        let trades = decode_tx(&tx);
        assert_eq!(trades.len(), 1);
    }

    #[test]
    fn test_create_seeds_price() {
        let mut accounts: Vec<Pubkey> = (0..14).map(|i| key(140 + i)).collect();
        accounts[0] = key(MINT);
        accounts[2] = key(40);
        accounts[3] = key(42);
        accounts[7] = key(1);

        let tx = TxBuilder::new("pump-create")
            .signer(key(1))
            .balance(key(42), key(MINT), key(40), 6, None, Some(1_000_000_000_000_000))
            .instruction(PUMP_FUN_PROGRAM, accounts, CREATE.to_le_bytes().to_vec())
            .build();

        let trades = decode_tx(&tx);
        let trade = &trades[0];
        assert_eq!(trade.trade_type, TradeType::PumpCreate);
        assert_eq!(trade.token_price_usd, dec!(0.00000155));
        assert_eq!(trade.init_base_token_amount, dec!(0.015));
        assert_eq!(trade.pump.as_ref().unwrap().status, PumpStatus::Create);
    }
}
