//! Raydium CPMM (constant product, Anchor).

use crate::blockchain::models::RawInstruction;
use crate::constants::{RAYDIUM_CPMM_PROGRAM, WSOL_MINT};
use crate::decoder::events::{decode_prefix, instruction_discriminator, program_data, split_discriminator};
use crate::decoder::{
    apply_legs, apply_vault_reserves, finish_swap, orient_swap, require_accounts, vault_liquidity, DecodeContext,
    DecodeError, DecodeResult, VaultPair,
};
use crate::models::pool::{CpmmPoolInfo, PoolInfo};
use crate::models::trade::{SwapName, Trade, TradeType};
use borsh::BorshDeserialize;
use solana_sdk::pubkey::Pubkey;
use std::sync::LazyLock;

const NAME: &str = "RaydiumCPMM";

const SWAP_ACCOUNTS: usize = 13;
const LIQUIDITY_ACCOUNTS: usize = 13;

static SWAP_BASE_INPUT: LazyLock<[u8; 8]> = LazyLock::new(|| instruction_discriminator("swap_base_input"));
static SWAP_BASE_OUTPUT: LazyLock<[u8; 8]> = LazyLock::new(|| instruction_discriminator("swap_base_output"));
static DEPOSIT: LazyLock<[u8; 8]> = LazyLock::new(|| instruction_discriminator("deposit"));
static WITHDRAW: LazyLock<[u8; 8]> = LazyLock::new(|| instruction_discriminator("withdraw"));

#[derive(BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct SwapEvent {
    pub pool_id: [u8; 32],
    pub input_vault_before: u64,
    pub output_vault_before: u64,
    pub input_amount: u64,
    pub output_amount: u64,
    pub input_transfer_fee: u64,
    pub output_transfer_fee: u64,
    pub base_input: bool,
}

/// Swap events logged by CPMM invocations of `instruction`. The program logs
/// its invoke line, then `Instruction: <name>`, then the event payload.
fn swap_events(logs: &[String], instruction: &str) -> Vec<SwapEvent> {
    let invoke = format!("Program {} invoke", RAYDIUM_CPMM_PROGRAM);
    let marker = format!("Instruction: {}", instruction);

    logs.windows(3)
        .filter(|window| window[0].starts_with(&invoke) && window[1].contains(&marker))
        .filter_map(|window| program_data(&window[2]))
        .filter_map(|bytes| decode_prefix(bytes.get(8..)?))
        .collect()
}

pub fn decode(ctx: &mut DecodeContext<'_>, ix: &RawInstruction, inner: Option<&[RawInstruction]>) -> DecodeResult {
    let Some((discriminator, _)) = split_discriminator(&ix.data) else {
        return Ok(None);
    };

    if discriminator == *SWAP_BASE_INPUT {
        decode_swap(ctx, ix, "SwapBaseInput")
    } else if discriminator == *SWAP_BASE_OUTPUT {
        decode_swap(ctx, ix, "SwapBaseOutput")
    } else if discriminator == *DEPOSIT {
        decode_liquidity(ctx, ix, inner, TradeType::AddPosition)
    } else if discriminator == *WITHDRAW {
        decode_liquidity(ctx, ix, inner, TradeType::RemovePosition)
    } else {
        Ok(None)
    }
}

/// Swaps read their amounts from the logged `SwapEvent`, consumed in order
/// per pool.
fn decode_swap(ctx: &mut DecodeContext<'_>, ix: &RawInstruction, instruction: &'static str) -> DecodeResult {
    require_accounts(ix, SWAP_ACCOUNTS, NAME)?;

    let payer = ix.accounts[0];
    let pool_state = ix.accounts[3];
    let from = ix.accounts[4];
    let to = ix.accounts[5];
    let input_vault = ix.accounts[6];
    let output_vault = ix.accounts[7];

    let pool_key = pool_state.to_string();
    let events: Vec<SwapEvent> = swap_events(&ctx.tx.log_messages, instruction)
        .into_iter()
        .filter(|event| Pubkey::new_from_array(event.pool_id) == pool_state)
        .collect();
    let position = ctx.events.next(&ctx.tx.signature, instruction, &pool_key);
    let event = events
        .get(position)
        .ok_or_else(|| DecodeError::EventNotFound(format!("cpmm swap event #{} for {}", position, pool_key)))?;

    let legs = orient_swap(ctx, &from, &to, event.input_amount, event.output_amount)?;

    let mut trade = Trade::new_sol(SwapName::RaydiumCpmm, TradeType::Buy);
    trade.pair_addr = pool_key;
    trade.maker = payer.to_string();
    apply_legs(&mut trade, &legs);
    apply_vault_reserves(ctx, &mut trade, &legs.token.mint, &[input_vault, output_vault]);

    let at = |index: usize| ix.accounts[index].to_string();
    let mut pool = CpmmPoolInfo {
        pool_state: at(3),
        amm_config: at(2),
        authority: at(1),
        input_vault: at(6),
        output_vault: at(7),
        input_token_program: at(8),
        output_token_program: at(9),
        input_token_mint: at(10),
        output_token_mint: at(11),
        observation_state: at(12),
        trade_fee_rate: 0,
        tx_hash: ctx.tx_hash().to_string(),
    };
    // Stored with wrapped SOL on the input side
    if ix.accounts[11] == WSOL_MINT {
        std::mem::swap(&mut pool.input_vault, &mut pool.output_vault);
        std::mem::swap(&mut pool.input_token_program, &mut pool.output_token_program);
        std::mem::swap(&mut pool.input_token_mint, &mut pool.output_token_mint);
    }
    trade.pool = Some(PoolInfo::Cpmm(pool));

    finish_swap(trade)
}

fn decode_liquidity(
    ctx: &mut DecodeContext<'_>,
    ix: &RawInstruction,
    inner: Option<&[RawInstruction]>,
    trade_type: TradeType,
) -> DecodeResult {
    require_accounts(ix, LIQUIDITY_ACCOUNTS, NAME)?;

    let owner = ix.accounts[0];
    let pool_state = ix.accounts[2];
    let vaults = VaultPair {
        vaults: [ix.accounts[6], ix.accounts[7]],
        mints: Some([ix.accounts[10], ix.accounts[11]]),
    };

    let mut trade = Trade::new_sol(SwapName::RaydiumCpmm, trade_type);
    trade.pair_addr = pool_state.to_string();
    trade.maker = owner.to_string();
    trade.to = pool_state.to_string();

    let into_vault = trade_type == TradeType::AddPosition;
    vault_liquidity(ctx, &mut trade, &vaults, inner, into_vault)?;
    Ok(Some(trade))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blockchain::models::fixtures::*;
    use crate::blockchain::models::RawTransaction;
    use crate::constants::TOKEN_PROGRAM;
    use crate::decoder::events::PROGRAM_DATA_PREFIX;
    use crate::decoder::{decode_transaction, snapshot, EventCounter, TokenAccountMap};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use rust_decimal_macros::dec;

    pub const MINT: u8 = 80;
    pub const POOL: u8 = 81;

    fn swap_event_log(pool: Pubkey, input: u64, output: u64) -> Vec<String> {
        let mut bytes = crate::decoder::events::event_discriminator("SwapEvent").to_vec();
        bytes.extend_from_slice(pool.as_ref());
        for value in [0u64, 0, input, output, 0, 0] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes.push(1);
        vec![
            format!("Program {} invoke [1]", RAYDIUM_CPMM_PROGRAM),
            "Program log: Instruction: SwapBaseInput".to_string(),
            format!("{}{}", PROGRAM_DATA_PREFIX, STANDARD.encode(bytes)),
        ]
    }

    /// Sell of `tokens` raw tokens for `lamports`, with transfers that
    /// disagree with the event so the event is provably the source.
    pub fn sell_tx(maker: Pubkey, tokens: u64, lamports: u64) -> RawTransaction {
        let mut accounts: Vec<Pubkey> = (0..13).map(|i| key(150 + i)).collect();
        accounts[0] = maker;
        accounts[3] = key(POOL);
        accounts[4] = key(20);
        accounts[5] = key(21);
        accounts[6] = key(22);
        accounts[7] = key(23);
        accounts[10] = key(MINT);
        accounts[11] = WSOL_MINT;

        let mut builder = TxBuilder::new("cpmm-sell")
            .signer(maker)
            .balance(key(20), key(MINT), maker, 6, Some(tokens), Some(0))
            .balance(key(21), WSOL_MINT, maker, 9, Some(0), Some(lamports))
            .balance(key(22), key(MINT), key(2), 6, Some(10_000_000), Some(10_000_000 + tokens))
            .balance(key(23), WSOL_MINT, key(2), 9, Some(50_000_000_000), Some(50_000_000_000 - lamports))
            .instruction(RAYDIUM_CPMM_PROGRAM, accounts, SWAP_BASE_INPUT.to_vec())
            .inner(0, TOKEN_PROGRAM, vec![key(20), key(22), maker], transfer_data(1))
            .inner(0, TOKEN_PROGRAM, vec![key(23), key(21), key(2)], transfer_data(1));
        for line in swap_event_log(key(POOL), tokens, lamports) {
            builder = builder.log(line);
        }
        builder.build()
    }

    fn decode_tx(tx: &RawTransaction) -> Vec<Trade> {
        let mut accounts = TokenAccountMap::new();
        snapshot(&mut accounts, tx);
        let mut events = EventCounter::new();
        decode_transaction(tx, 0, &accounts, dec!(100), &mut events, false).unwrap()
    }

    #[test]
    fn test_swap_amounts_come_from_event() {
        let trades = decode_tx(&sell_tx(key(1), 4_000_000, 2_000_000_000));
        assert_eq!(trades.len(), 1);

        let trade = &trades[0];
        assert_eq!(trade.trade_type, TradeType::Sell);
        assert_eq!(trade.token_amount, dec!(4));
        assert_eq!(trade.base_token_amount, dec!(2));
        assert_eq!(trade.total_usd, dec!(200));
        assert_eq!(trade.token_price_usd, dec!(50));
        assert_eq!(trade.maker, key(1).to_string());
        assert_eq!(trade.current_base_token_in_pool_amount, dec!(48));

        match trade.pool.as_ref() {
            Some(PoolInfo::Cpmm(pool)) => {
                assert_eq!(pool.input_token_mint, WSOL_MINT.to_string());
                assert_eq!(pool.input_vault, key(23).to_string());
            }
            other => panic!("unexpected pool {:?}", other),
        }
    }

    #[test]
    fn test_swap_without_event_is_dropped() {
        let mut tx = sell_tx(key(1), 4_000_000, 2_000_000_000);
        tx.log_messages.truncate(1);
        assert!(decode_tx(&tx).is_empty());
    }

    #[test]
    fn test_deposit_reads_vault_transfers() {
        let maker = key(1);
        let mut accounts: Vec<Pubkey> = (0..14).map(|i| key(170 + i)).collect();
        accounts[0] = maker;
        accounts[2] = key(POOL);
        accounts[6] = key(22);
        accounts[7] = key(23);
        accounts[10] = key(MINT);
        accounts[11] = WSOL_MINT;

        let tx = TxBuilder::new("cpmm-deposit")
            .signer(maker)
            .balance(key(22), key(MINT), key(2), 6, Some(10_000_000), Some(13_000_000))
            .balance(key(23), WSOL_MINT, key(2), 9, Some(1_000_000_000), Some(1_500_000_000))
            .instruction(RAYDIUM_CPMM_PROGRAM, accounts, DEPOSIT.to_vec())
            .inner(0, TOKEN_PROGRAM, vec![key(20), key(22), maker], transfer_data(3_000_000))
            .inner(0, TOKEN_PROGRAM, vec![key(21), key(23), maker], transfer_data(500_000_000))
            .build();

        let trades = decode_tx(&tx);
        let trade = &trades[0];
        assert_eq!(trade.trade_type, TradeType::AddPosition);
        assert_eq!(trade.token_amount, dec!(3));
        assert_eq!(trade.base_token_amount, dec!(0.5));
        assert_eq!(trade.current_base_token_in_pool_amount, dec!(1.5));
        assert_eq!(trade.current_token_in_pool_amount, dec!(13));
    }
}
