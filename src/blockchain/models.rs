//! Decoder input model built from `getBlock` responses. Every account index
//! in an instruction or token balance is resolved against the transaction's
//! full key table, including addresses loaded from lookup tables.

use solana_sdk::pubkey::Pubkey;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{
    EncodedTransactionWithStatusMeta, UiConfirmedBlock, UiInstruction, UiTransactionTokenBalance,
};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInstruction {
    pub program_id: Pubkey,
    pub accounts: Vec<Pubkey>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTokenBalance {
    pub account: Pubkey,
    pub mint: Pubkey,
    pub owner: Option<Pubkey>,
    pub amount: u64,
    pub decimals: u8,
}

#[derive(Debug, Clone, Default)]
pub struct RawTransaction {
    pub signature: String,
    pub account_keys: Vec<Pubkey>,
    pub instructions: Vec<RawInstruction>,
    /// Inner instructions keyed by the outer instruction index.
    pub inner_instructions: BTreeMap<usize, Vec<RawInstruction>>,
    pub log_messages: Vec<String>,
    pub pre_token_balances: Vec<RawTokenBalance>,
    pub post_token_balances: Vec<RawTokenBalance>,
    pub failed: bool,
}

impl RawTransaction {
    pub fn inner_group(&self, outer_index: usize) -> Option<&[RawInstruction]> {
        self.inner_instructions.get(&outer_index).map(|group| group.as_slice())
    }

    /// The fee payer, i.e. the first signer.
    pub fn signer(&self) -> Option<Pubkey> {
        self.account_keys.first().copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RawBlock {
    pub slot: u64,
    pub block_time: Option<i64>,
    pub block_height: Option<u64>,
    pub transactions: Vec<RawTransaction>,
}

fn serialized<T>(value: &OptionSerializer<T>) -> Option<&T> {
    match value {
        OptionSerializer::Some(inner) => Some(inner),
        _ => None,
    }
}

fn resolve(keys: &[Pubkey], index: u8) -> Option<Pubkey> {
    keys.get(index as usize).copied()
}

fn resolve_all(keys: &[Pubkey], indexes: &[u8]) -> Option<Vec<Pubkey>> {
    indexes.iter().map(|i| resolve(keys, *i)).collect()
}

fn convert_token_balance(keys: &[Pubkey], balance: &UiTransactionTokenBalance) -> Option<RawTokenBalance> {
    let account = resolve(keys, balance.account_index)?;
    let mint = Pubkey::from_str(&balance.mint).ok()?;
    let owner = serialized(&balance.owner).and_then(|o| Pubkey::from_str(o).ok());
    let amount = balance.ui_token_amount.amount.parse::<u64>().ok()?;

    Some(RawTokenBalance {
        account,
        mint,
        owner,
        amount,
        decimals: balance.ui_token_amount.decimals,
    })
}

/// Extract one transaction; `None` when the payload cannot be decoded.
pub fn extract_transaction(encoded: &EncodedTransactionWithStatusMeta) -> Option<RawTransaction> {
    let versioned = encoded.transaction.decode()?;
    let meta = encoded.meta.as_ref()?;

    let signature = versioned.signatures.first().map(|s| s.to_string()).unwrap_or_default();

    // Static keys first, then loaded writable, then loaded readonly
    let mut account_keys = versioned.message.static_account_keys().to_vec();
    if let Some(loaded) = serialized(&meta.loaded_addresses) {
        for address in loaded.writable.iter().chain(loaded.readonly.iter()) {
            match Pubkey::from_str(address) {
                Ok(key) => account_keys.push(key),
                Err(_) => {
                    warn!("Transaction {} has malformed loaded address {}", signature, address);
                    return None;
                }
            }
        }
    }

    let instructions = versioned
        .message
        .instructions()
        .iter()
        .filter_map(|ix| {
            Some(RawInstruction {
                program_id: resolve(&account_keys, ix.program_id_index)?,
                accounts: resolve_all(&account_keys, &ix.accounts)?,
                data: ix.data.clone(),
            })
        })
        .collect();

    let mut inner_instructions = BTreeMap::new();
    if let Some(groups) = serialized(&meta.inner_instructions) {
        for group in groups {
            let decoded: Vec<RawInstruction> = group
                .instructions
                .iter()
                .filter_map(|ix| match ix {
                    UiInstruction::Compiled(compiled) => Some(RawInstruction {
                        program_id: resolve(&account_keys, compiled.program_id_index)?,
                        accounts: resolve_all(&account_keys, &compiled.accounts)?,
                        data: bs58::decode(&compiled.data).into_vec().ok()?,
                    }),
                    UiInstruction::Parsed(_) => None,
                })
                .collect();
            inner_instructions.insert(group.index as usize, decoded);
        }
    }

    let log_messages = serialized(&meta.log_messages).cloned().unwrap_or_default();

    let pre_token_balances = serialized(&meta.pre_token_balances)
        .map(|balances| {
            balances
                .iter()
                .filter_map(|b| convert_token_balance(&account_keys, b))
                .collect()
        })
        .unwrap_or_default();
    let post_token_balances = serialized(&meta.post_token_balances)
        .map(|balances| {
            balances
                .iter()
                .filter_map(|b| convert_token_balance(&account_keys, b))
                .collect()
        })
        .unwrap_or_default();

    Some(RawTransaction {
        signature,
        account_keys,
        instructions,
        inner_instructions,
        log_messages,
        pre_token_balances,
        post_token_balances,
        failed: meta.err.is_some(),
    })
}

/// Convert a `getBlock` response into the decoder input model.
pub fn extract_block(slot: u64, block: &UiConfirmedBlock) -> RawBlock {
    let encoded = block.transactions.as_deref().unwrap_or_default();
    let mut transactions = Vec::with_capacity(encoded.len());

    for (index, tx) in encoded.iter().enumerate() {
        match extract_transaction(tx) {
            Some(raw) => transactions.push(raw),
            None => {
                // Keep positions stable so tx_index matches the block order
                debug!("Slot {} transaction {} could not be decoded", slot, index);
                transactions.push(RawTransaction { failed: true, ..Default::default() });
            }
        }
    }

    RawBlock {
        slot,
        block_time: block.block_time,
        block_height: block.block_height,
        transactions,
    }
}

#[cfg(test)]
pub mod fixtures {
    //! Builders for hand-made transactions used across decoder tests.

    use super::*;

    pub fn key(seed: u8) -> Pubkey {
        Pubkey::new_from_array([seed; 32])
    }

    #[derive(Default)]
    pub struct TxBuilder {
        tx: RawTransaction,
    }

    impl TxBuilder {
        pub fn new(signature: &str) -> Self {
            let mut builder = Self::default();
            builder.tx.signature = signature.to_string();
            builder.tx.log_messages.push("Program log: fixture".to_string());
            builder
        }

        pub fn signer(mut self, signer: Pubkey) -> Self {
            self.tx.account_keys.insert(0, signer);
            self
        }

        pub fn instruction(mut self, program_id: Pubkey, accounts: Vec<Pubkey>, data: Vec<u8>) -> Self {
            self.tx.instructions.push(RawInstruction { program_id, accounts, data });
            self
        }

        pub fn inner(mut self, outer_index: usize, program_id: Pubkey, accounts: Vec<Pubkey>, data: Vec<u8>) -> Self {
            self.tx
                .inner_instructions
                .entry(outer_index)
                .or_default()
                .push(RawInstruction { program_id, accounts, data });
            self
        }

        pub fn log(mut self, line: impl Into<String>) -> Self {
            self.tx.log_messages.push(line.into());
            self
        }

        pub fn no_logs(mut self) -> Self {
            self.tx.log_messages.clear();
            self
        }

        pub fn balance(mut self, account: Pubkey, mint: Pubkey, owner: Pubkey, decimals: u8, pre: Option<u64>, post: Option<u64>) -> Self {
            if let Some(amount) = pre {
                self.tx.pre_token_balances.push(RawTokenBalance {
                    account,
                    mint,
                    owner: Some(owner),
                    amount,
                    decimals,
                });
            }
            if let Some(amount) = post {
                self.tx.post_token_balances.push(RawTokenBalance {
                    account,
                    mint,
                    owner: Some(owner),
                    amount,
                    decimals,
                });
            }
            self
        }

        pub fn failed(mut self) -> Self {
            self.tx.failed = true;
            self
        }

        pub fn build(self) -> RawTransaction {
            self.tx
        }
    }

    /// SPL `Transfer` data.
    pub fn transfer_data(amount: u64) -> Vec<u8> {
        let mut data = vec![3u8];
        data.extend_from_slice(&amount.to_le_bytes());
        data
    }

    /// SPL `TransferChecked` data.
    pub fn transfer_checked_data(amount: u64, decimals: u8) -> Vec<u8> {
        let mut data = vec![12u8];
        data.extend_from_slice(&amount.to_le_bytes());
        data.push(decimals);
        data
    }
}
