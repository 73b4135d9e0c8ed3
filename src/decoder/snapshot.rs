//! Token-account snapshot of a transaction: who owns which token account,
//! its mint and decimals, and the balance before and after.

use crate::blockchain::models::{RawInstruction, RawTransaction};
use crate::constants::{TOKEN_2022_PROGRAM, TOKEN_PROGRAM};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;

const INITIALIZE_ACCOUNT: u8 = 1;
const INITIALIZE_ACCOUNT_2: u8 = 16;
const INITIALIZE_ACCOUNT_3: u8 = 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    pub address: Pubkey,
    pub owner: Option<Pubkey>,
    pub mint: Pubkey,
    pub decimals: u8,
    pub pre: u64,
    pub post: u64,
    pub init: bool,
    pub closed: bool,
}

pub type TokenAccountMap = HashMap<Pubkey, TokenAccount>;

/// Fold one transaction into `map`. Returns true when any token balance
/// changed or a token account appeared.
pub fn snapshot(map: &mut TokenAccountMap, tx: &RawTransaction) -> bool {
    let mut changed = false;

    for balance in &tx.pre_token_balances {
        map.insert(
            balance.account,
            TokenAccount {
                address: balance.account,
                owner: balance.owner,
                mint: balance.mint,
                decimals: balance.decimals,
                pre: balance.amount,
                post: 0,
                init: false,
                closed: true,
            },
        );
    }

    for balance in &tx.post_token_balances {
        match map.get_mut(&balance.account) {
            Some(account) => {
                account.closed = false;
                account.post = balance.amount;
                if account.post != account.pre {
                    changed = true;
                }
            }
            None => {
                changed = true;
                map.insert(
                    balance.account,
                    TokenAccount {
                        address: balance.account,
                        owner: balance.owner,
                        mint: balance.mint,
                        decimals: balance.decimals,
                        pre: 0,
                        post: balance.amount,
                        init: true,
                        closed: false,
                    },
                );
            }
        }
    }

    let inner = tx.inner_instructions.values().flatten();
    for ix in tx.instructions.iter().chain(inner) {
        if ix.program_id == TOKEN_PROGRAM || ix.program_id == TOKEN_2022_PROGRAM {
            record_initialize_account(map, ix);
        }
    }

    backfill_decimals(map);
    changed
}

fn record_initialize_account(map: &mut TokenAccountMap, ix: &RawInstruction) {
    let Some(&tag) = ix.data.first() else {
        return;
    };

    let (account, mint, owner) = match tag {
        INITIALIZE_ACCOUNT if ix.accounts.len() >= 3 => (ix.accounts[0], ix.accounts[1], ix.accounts[2]),
        INITIALIZE_ACCOUNT_2 | INITIALIZE_ACCOUNT_3 if ix.accounts.len() >= 2 && ix.data.len() >= 33 => {
            let Ok(owner) = Pubkey::try_from(&ix.data[1..33]) else {
                return;
            };
            (ix.accounts[0], ix.accounts[1], owner)
        }
        _ => return,
    };

    if map.get(&account).is_some_and(|existing| existing.mint == mint) {
        return;
    }

    map.insert(
        account,
        TokenAccount {
            address: account,
            owner: Some(owner),
            mint,
            decimals: 0,
            pre: 0,
            post: 0,
            init: true,
            closed: false,
        },
    );
}

fn backfill_decimals(map: &mut TokenAccountMap) {
    let known: HashMap<Pubkey, u8> = map
        .values()
        .filter(|account| account.decimals != 0)
        .map(|account| (account.mint, account.decimals))
        .collect();

    for account in map.values_mut().filter(|account| account.decimals == 0) {
        if let Some(decimals) = known.get(&account.mint) {
            account.decimals = *decimals;
        }
    }
}
