use crate::blockchain::client::ClientError;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use solana_sdk::pubkey::Pubkey;
use std::num::NonZeroU32;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unknown program: {0}")]
    UnknownProgram(Pubkey),

    #[error("Swap does not involve wrapped SOL")]
    UnsupportedSwap,

    #[error("Token amount is zero")]
    TokenAmountIsZero,

    #[error("Invalid instruction: {0}")]
    InvalidInstruction(String),

    #[error("{program} expects {expected} accounts, got {actual}")]
    AccountCountMismatch {
        program: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Transaction has no log messages, likely a vote")]
    VoteTransaction,

    #[error("Chain client error: {0}")]
    Client(#[from] ClientError),
}

impl DecodeError {
    /// Expected outcomes that are dropped without logging.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            DecodeError::UnknownProgram(_)
                | DecodeError::UnsupportedSwap
                | DecodeError::TokenAmountIsZero
                | DecodeError::VoteTransaction
        )
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        DecodeError::InvalidInstruction(message.into())
    }
}

/// At most one warn per decoder per second; the rest go to debug.
static WARN_LIMITER: LazyLock<DefaultKeyedRateLimiter<&'static str>> =
    LazyLock::new(|| RateLimiter::keyed(Quota::per_second(NonZeroU32::MIN)));

pub fn report(decoder: &'static str, tx_hash: &str, err: &DecodeError) {
    if err.is_silent() {
        return;
    }
    if WARN_LIMITER.check_key(&decoder).is_ok() {
        warn!(decoder, tx_hash, "Dropped instruction: {}", err);
    } else {
        debug!(decoder, tx_hash, "Dropped instruction: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_outcomes_are_silent() {
        assert!(DecodeError::UnsupportedSwap.is_silent());
        assert!(DecodeError::TokenAmountIsZero.is_silent());
        assert!(DecodeError::UnknownProgram(Pubkey::default()).is_silent());
        assert!(!DecodeError::invalid("bad data").is_silent());
        assert!(!DecodeError::AccountCountMismatch { program: "RaydiumV4", expected: 17, actual: 3 }.is_silent());
    }
}
