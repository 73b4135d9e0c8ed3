use crate::blockchain::models::RawInstruction;
use crate::constants::{TOKEN_2022_PROGRAM, TOKEN_PROGRAM};
use crate::decoder::snapshot::TokenAccountMap;
use solana_sdk::pubkey::Pubkey;

const TRANSFER: u8 = 3;
const TRANSFER_CHECKED: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub from: Pubkey,
    pub to: Pubkey,
    pub authority: Pubkey,
    pub amount: u64,
}

fn read_u64(data: &[u8]) -> Option<u64> {
    data.get(..8)?.try_into().ok().map(u64::from_le_bytes)
}

/// Decode an SPL `Transfer` or `TransferChecked`; anything else is `None`.
pub fn decode_transfer(ix: &RawInstruction) -> Option<Transfer> {
    if ix.program_id != TOKEN_PROGRAM && ix.program_id != TOKEN_2022_PROGRAM {
        return None;
    }

    match *ix.data.first()? {
        TRANSFER if ix.data.len() == 9 && ix.accounts.len() >= 3 => Some(Transfer {
            from: ix.accounts[0],
            to: ix.accounts[1],
            authority: ix.accounts[2],
            amount: read_u64(&ix.data[1..])?,
        }),
        TRANSFER_CHECKED if ix.data.len() >= 10 && ix.accounts.len() >= 4 => Some(Transfer {
            from: ix.accounts[0],
            to: ix.accounts[2],
            authority: ix.accounts[3],
            amount: read_u64(&ix.data[1..])?,
        }),
        _ => None,
    }
}

/// Two transfers are legs of one user/pool swap when one leg's sender owns
/// the other leg's recipient.
pub fn is_swap_transfer(a: &Transfer, b: &Transfer, accounts: &TokenAccountMap) -> bool {
    let owner = |key: &Pubkey| accounts.get(key).and_then(|account| account.owner);

    let (Some(a_from), Some(a_to), Some(b_from), Some(b_to)) =
        (owner(&a.from), owner(&a.to), owner(&b.from), owner(&b.to))
    else {
        return false;
    };

    a_from == b_to || b_from == a_to
}

/// The transfer leaving `from` and the one arriving at `to` within a group.
pub fn find_swap_legs(group: &[RawInstruction], from: &Pubkey, to: &Pubkey) -> (Option<Transfer>, Option<Transfer>) {
    let mut from_leg = None;
    let mut to_leg = None;

    for transfer in group.iter().filter_map(decode_transfer) {
        if transfer.from == *from {
            from_leg = Some(transfer);
        } else if transfer.to == *to {
            to_leg = Some(transfer);
        }
    }

    (from_leg, to_leg)
}

/// Sum of the transfers in a group that credit (`into_vault`) or debit `vault`.
pub fn vault_transfer_amount(group: &[RawInstruction], vault: &Pubkey, into_vault: bool) -> u64 {
    group
        .iter()
        .filter_map(decode_transfer)
        .filter(|t| if into_vault { t.to == *vault } else { t.from == *vault })
        .fold(0u64, |sum, t| sum.saturating_add(t.amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::models::fixtures::*;
    use crate::decoder::snapshot::TokenAccount;

    fn ix(accounts: Vec<Pubkey>, data: Vec<u8>) -> RawInstruction {
        RawInstruction { program_id: TOKEN_PROGRAM, accounts, data }
    }

    fn account(address: Pubkey, owner: Pubkey) -> (Pubkey, TokenAccount) {
        (
            address,
            TokenAccount {
                address,
                owner: Some(owner),
                mint: key(99),
                decimals: 6,
                pre: 0,
                post: 0,
                init: false,
                closed: false,
            },
        )
    }

    #[test]
    fn test_decode_transfer_variants() {
        let plain = decode_transfer(&ix(vec![key(1), key(2), key(3)], transfer_data(500))).unwrap();
        assert_eq!((plain.from, plain.to, plain.amount), (key(1), key(2), 500));

        let checked = decode_transfer(&ix(
            vec![key(1), key(9), key(2), key(3)],
            transfer_checked_data(700, 6),
        ))
        .unwrap();
        assert_eq!((checked.from, checked.to, checked.amount), (key(1), key(2), 700));

        assert!(decode_transfer(&ix(vec![key(1)], transfer_data(1))).is_none());
        let mut foreign = ix(vec![key(1), key(2), key(3)], transfer_data(1));
        foreign.program_id = key(77);
        assert!(decode_transfer(&foreign).is_none());
    }

    #[test]
    fn test_is_swap_transfer_matches_owner_cycle() {
        let user = key(100);
        let pool = key(101);
        let accounts: TokenAccountMap = [
            account(key(1), user),
            account(key(2), pool),
            account(key(3), pool),
            account(key(4), user),
            account(key(5), key(102)),
            account(key(6), key(102)),
        ]
        .into_iter()
        .collect();

        let pay = Transfer { from: key(1), to: key(2), authority: user, amount: 1 };
        let receive = Transfer { from: key(3), to: key(4), authority: pool, amount: 2 };
        assert!(is_swap_transfer(&pay, &receive, &accounts));

        let unrelated = Transfer { from: key(5), to: key(6), authority: key(102), amount: 2 };
        assert!(!is_swap_transfer(&pay, &unrelated, &accounts));

        let unknown = Transfer { from: key(8), to: key(4), authority: pool, amount: 2 };
        assert!(!is_swap_transfer(&pay, &unknown, &accounts));
    }
}
