//! SPL token and token-2022 supply changes.

use crate::blockchain::models::RawInstruction;
use crate::decoder::{require_accounts, DecodeContext, DecodeError, DecodeResult};
use crate::models::trade::{SupplyChange, SwapName, Trade, TradeType};

const NAME: &str = "Token";

const MINT_TO: u8 = 7;
const BURN: u8 = 8;
const MINT_TO_CHECKED: u8 = 14;
const BURN_CHECKED: u8 = 15;

fn amount(data: &[u8]) -> Result<u64, DecodeError> {
    data.get(1..9)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| DecodeError::invalid("token amount"))
}

pub fn decode(ctx: &mut DecodeContext<'_>, ix: &RawInstruction, _inner: Option<&[RawInstruction]>) -> DecodeResult {
    let Some(&tag) = ix.data.first() else {
        return Ok(None);
    };

    // MintTo: [mint, account, authority]; Burn: [account, mint, owner]
    let (trade_type, mint, account) = match tag {
        MINT_TO | MINT_TO_CHECKED => {
            require_accounts(ix, 3, NAME)?;
            (TradeType::TokenMint, ix.accounts[0], ix.accounts[1])
        }
        BURN | BURN_CHECKED => {
            require_accounts(ix, 3, NAME)?;
            (TradeType::TokenBurn, ix.accounts[1], ix.accounts[0])
        }
        _ => return Ok(None),
    };

    let raw = amount(&ix.data)?;
    if raw == 0 {
        return Err(DecodeError::TokenAmountIsZero);
    }

    // Checked variants carry the decimals after the amount
    let decimals = match tag {
        MINT_TO_CHECKED | BURN_CHECKED => ix.data.get(9).copied(),
        _ => ctx.decimals_of(&account),
    };

    let mut trade = Trade::new_sol(SwapName::Token, trade_type);
    trade.maker = ix.accounts[2].to_string();
    trade.to = account.to_string();
    trade.token_addr = mint.to_string();
    trade.token_account = account.to_string();
    match decimals {
        Some(decimals) => trade.token_decimals = decimals,
        None => trade.decimals_pending = true,
    }
    trade.raw.token = raw;
    trade.supply_change = Some(SupplyChange {
        mint: mint.to_string(),
        account: account.to_string(),
        amount: raw,
    });

    trade.rescale();
    Ok(Some(trade))
}
