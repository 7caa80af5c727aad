//! Inclusive block ranges.

use alloy_primitives::U256;

use crate::error::FailureCause;
use crate::schemas::BlockNumber;

/// Ascending iterator over every block number in `[start, end]`.
///
/// The iterator is consumed as it goes; a fresh range has to be built to scan
/// again.
#[derive(Debug, Clone)]
pub struct BlockRange {
    start: BlockNumber,
    end: BlockNumber,
    next: Option<BlockNumber>,
}

impl BlockRange {
    pub fn new(start: BlockNumber, end: BlockNumber) -> Result<Self, FailureCause> {
        if start > end {
            return Err(FailureCause::InvalidRange { start, end });
        }
        Ok(Self {
            start,
            end,
            next: Some(start),
        })
    }

    pub fn start(&self) -> BlockNumber {
        self.start
    }

    pub fn end(&self) -> BlockNumber {
        self.end
    }

    /// Number of blocks in the whole range, including those already yielded.
    /// Saturates for the full `0..=U256::MAX` range.
    pub fn len(&self) -> U256 {
        (self.end - self.start).saturating_add(U256::from(1u8))
    }

    pub fn contains(&self, number: &BlockNumber) -> bool {
        *number >= self.start && *number <= self.end
    }
}

/// Parse a block number given in decimal or as a `0x`-prefixed hex quantity.
pub fn parse_block_number(raw: &str) -> Result<BlockNumber, String> {
    let raw = raw.trim();
    let (digits, radix) = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (raw, 10),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix as u32)) {
        return Err(format!("invalid block number: {:?}", raw));
    }
    U256::from_str_radix(digits, radix).map_err(|e| format!("invalid block number {:?}: {}", raw, e))
}

impl Iterator for BlockRange {
    type Item = BlockNumber;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = if current < self.end {
            Some(current + U256::from(1u8))
        } else {
            None
        };
        Some(current)
    }
}
