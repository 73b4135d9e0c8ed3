use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Processing,
    Processed,
    Failed,
    Skipped,
}

impl BlockStatus {
    pub fn as_i64(&self) -> i64 {
        match self {
            BlockStatus::Processing => 1,
            BlockStatus::Processed => 2,
            BlockStatus::Failed => 3,
            BlockStatus::Skipped => 4,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(BlockStatus::Processing),
            2 => Some(BlockStatus::Processed),
            3 => Some(BlockStatus::Failed),
            4 => Some(BlockStatus::Skipped),
            _ => None,
        }
    }

    /// Terminal slots are never fetched again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BlockStatus::Processed | BlockStatus::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub slot: u64,
    pub block_height: Option<u64>,
    pub block_time: Option<i64>,
    pub status: BlockStatus,
    pub sol_price: Decimal,
}

impl BlockRecord {
    pub fn new(slot: u64, status: BlockStatus) -> Self {
        Self {
            slot,
            block_height: None,
            block_time: None,
            status,
            sol_price: Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_and_terminality() {
        for status in [
            BlockStatus::Processing,
            BlockStatus::Processed,
            BlockStatus::Failed,
            BlockStatus::Skipped,
        ] {
            assert_eq!(BlockStatus::from_i64(status.as_i64()), Some(status));
        }
        assert_eq!(BlockStatus::from_i64(9), None);
        assert!(BlockStatus::Processed.is_terminal());
        assert!(BlockStatus::Skipped.is_terminal());
        assert!(!BlockStatus::Failed.is_terminal());
        assert!(!BlockStatus::Processing.is_terminal());
    }
}
