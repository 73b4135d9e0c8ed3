//! SOL/USD price of a block, read off SOL/stable swaps routed through a
//! whitelist of well-known pools.

use crate::blockchain::models::{RawBlock, RawInstruction};
use crate::config::Config;
use crate::constants::{STABLE_SWAP_PROGRAMS, USDC_MINT, USDT_MINT, WSOL_MINT};
use crate::decoder::snapshot::{snapshot, TokenAccountMap};
use crate::decoder::transfer::{decode_transfer, is_swap_transfer, Transfer};
use crate::models::amount::{checked_ratio, trimmed_mean};
use rust_decimal::Decimal;

/// USD stables carry 6 decimals and SOL 9, so the raw ratio is off by 1e3.
const DECIMALS_ADJUSTMENT: i64 = 1000;

fn leg_price(usd: &Transfer, sol: &Transfer) -> Option<Decimal> {
    checked_ratio(Decimal::from(usd.amount), Decimal::from(sol.amount))?.checked_mul(Decimal::from(DECIMALS_ADJUSTMENT))
}

/// Scan a run of consecutive transfers for an adjacent SOL leg and USD leg
/// that form one swap. Any transfer that is neither breaks the run.
pub fn transfer_price(group: &[RawInstruction], accounts: &TokenAccountMap) -> Option<Decimal> {
    let mut sol_leg: Option<Transfer> = None;
    let mut usd_leg: Option<Transfer> = None;

    for ix in group {
        let leg = decode_transfer(ix).and_then(|transfer| {
            let from = accounts.get(&transfer.from)?;
            accounts.get(&transfer.to)?;
            Some((transfer, from.mint))
        });

        match leg {
            Some((transfer, mint)) if mint == WSOL_MINT => {
                if let Some(usd) = usd_leg.take() {
                    if is_swap_transfer(&transfer, &usd, accounts) {
                        return leg_price(&usd, &transfer);
                    }
                }
                sol_leg = Some(transfer);
            }
            Some((transfer, mint)) if mint == USDC_MINT || mint == USDT_MINT => {
                if let Some(sol) = sol_leg.take() {
                    if is_swap_transfer(&sol, &transfer, accounts) {
                        return leg_price(&transfer, &sol);
                    }
                }
                usd_leg = Some(transfer);
            }
            _ => {
                sol_leg = None;
                usd_leg = None;
            }
        }
    }

    None
}

/// Every SOL price observed in the block. `accounts` accumulates the
/// snapshot of each transaction scanned.
pub fn observe_block_prices(block: &RawBlock, accounts: &mut TokenAccountMap) -> Vec<Decimal> {
    let mut prices = Vec::new();

    for tx in &block.transactions {
        if !snapshot(accounts, tx) {
            continue;
        }

        for (index, ix) in tx.instructions.iter().enumerate() {
            if !STABLE_SWAP_PROGRAMS.contains(&ix.program_id) {
                continue;
            }
            if let Some(price) = tx.inner_group(index).and_then(|group| transfer_price(group, accounts)) {
                prices.push(price);
            }
        }

        // Whitelisted pools invoked through CPI: the two instructions that follow
        for group in tx.inner_instructions.values() {
            for (i, ix) in group.iter().enumerate() {
                if !STABLE_SWAP_PROGRAMS.contains(&ix.program_id) || i + 3 > group.len() {
                    continue;
                }
                if let Some(price) = transfer_price(&group[i + 1..i + 3], accounts) {
                    prices.push(price);
                }
            }
        }
    }

    prices.retain(|price| *price > Decimal::ZERO);
    prices
}

/// Trimmed mean of the observed prices, `None` when nothing was observed.
pub fn block_base_price(block: &RawBlock, accounts: &mut TokenAccountMap) -> Option<Decimal> {
    let prices = observe_block_prices(block, accounts);
    trimmed_mean(&prices).filter(|price| *price > Decimal::ZERO)
}

/// Last-resort price once neither the block nor the previous block gave one:
/// the nearest persisted block price, else the configured constants.
pub fn fallback_price<E>(nearest: Result<Option<Decimal>, E>, config: &Config) -> Decimal {
    match nearest {
        Ok(Some(price)) if price > Decimal::ZERO => price,
        Ok(_) => config.fallback_sol_price,
        Err(_) => config.fallback_sol_price_secondary,
    }
}
