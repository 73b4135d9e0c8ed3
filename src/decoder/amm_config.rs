//! AMM config accounts of the Raydium CPMM and CLMM programs. Pool records
//! store the trade fee rate read from them.

use crate::decoder::events::{anchor_discriminator, decode_prefix, split_discriminator};
use borsh::{BorshDeserialize, BorshSerialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmmKind {
    Cpmm,
    Clmm,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct CpmmAmmConfig {
    pub bump: u8,
    pub disable_create_pool: bool,
    pub index: u16,
    pub trade_fee_rate: u64,
    pub protocol_fee_rate: u64,
    pub fund_fee_rate: u64,
    pub create_pool_fee: u64,
    pub protocol_owner: [u8; 32],
    pub fund_owner: [u8; 32],
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClmmAmmConfig {
    pub bump: u8,
    pub index: u16,
    pub owner: [u8; 32],
    pub protocol_fee_rate: u32,
    pub trade_fee_rate: u32,
    pub tick_spacing: u16,
    pub fund_fee_rate: u32,
}

/// Trade fee rate in millionths, or `None` when the account is not an AMM config.
pub fn trade_fee_rate(kind: AmmKind, data: &[u8]) -> Option<u64> {
    let (disc, body) = split_discriminator(data)?;
    if disc != anchor_discriminator("account", "AmmConfig") {
        return None;
    }

    match kind {
        AmmKind::Cpmm => decode_prefix::<CpmmAmmConfig>(body).map(|config| config.trade_fee_rate),
        AmmKind::Clmm => decode_prefix::<ClmmAmmConfig>(body).map(|config| config.trade_fee_rate as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account<T: BorshSerialize>(config: &T) -> Vec<u8> {
        let mut data = anchor_discriminator("account", "AmmConfig").to_vec();
        data.extend(borsh::to_vec(config).unwrap());
        // padding that follows the fields
        data.extend([0u8; 64]);
        data
    }

    #[test]
    fn test_fee_rates() {
        let cpmm = CpmmAmmConfig {
            bump: 1,
            disable_create_pool: false,
            index: 0,
            trade_fee_rate: 2500,
            protocol_fee_rate: 120_000,
            fund_fee_rate: 40_000,
            create_pool_fee: 150_000_000,
            protocol_owner: [1; 32],
            fund_owner: [2; 32],
        };
        assert_eq!(trade_fee_rate(AmmKind::Cpmm, &account(&cpmm)), Some(2500));

        let clmm = ClmmAmmConfig {
            bump: 1,
            index: 4,
            owner: [3; 32],
            protocol_fee_rate: 120_000,
            trade_fee_rate: 100,
            tick_spacing: 1,
            fund_fee_rate: 40_000,
        };
        assert_eq!(trade_fee_rate(AmmKind::Clmm, &account(&clmm)), Some(100));
    }

    #[test]
    fn test_rejects_other_accounts() {
        assert_eq!(trade_fee_rate(AmmKind::Cpmm, &[0u8; 100]), None);
        assert_eq!(trade_fee_rate(AmmKind::Clmm, &[1, 2, 3]), None);
    }
}
