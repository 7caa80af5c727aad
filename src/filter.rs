//! Value filter applied to every fetched transaction.
//!
//! Only transactions that move a positive amount are kept; zero-value
//! transactions are dropped without error.

use alloy_primitives::U256;
use thiserror::Error;

use crate::ledger::TransactionDetail;
use crate::schemas::TransactionRecord;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transaction {hash}: {reason}")]
pub struct FilterError {
    pub hash: String,
    pub reason: String,
}

impl FilterError {
    fn new(hash: &str, reason: impl Into<String>) -> Self {
        Self {
            hash: hash.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parse a hex quantity such as `0x1bc16d674ec80000`.
pub fn parse_hex_value(raw: &str) -> Option<U256> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    U256::from_str_radix(digits, 16).ok()
}

/// Decide whether a transaction belongs in the output and project it.
///
/// Returns `Ok(None)` for zero-value transactions.
pub fn filter_transaction(
    hash: &str,
    detail: TransactionDetail,
) -> Result<Option<TransactionRecord>, FilterError> {
    let raw_value = detail
        .value
        .ok_or_else(|| FilterError::new(hash, "missing field `value`"))?;
    let value = parse_hex_value(&raw_value)
        .ok_or_else(|| FilterError::new(hash, format!("invalid hex value {:?}", raw_value)))?;

    if value.is_zero() {
        return Ok(None);
    }

    let from = detail
        .from
        .ok_or_else(|| FilterError::new(hash, "missing field `from`"))?;
    let input = detail
        .input
        .ok_or_else(|| FilterError::new(hash, "missing field `input`"))?;
    let nonce = detail
        .nonce
        .ok_or_else(|| FilterError::new(hash, "missing field `nonce`"))?;

    Ok(Some(TransactionRecord {
        hash: hash.to_string(),
        from,
        input,
        nonce,
    }))
}
