//! Data schemas for the block scanner.
//!
//! This module is the canonical definition of every record that leaves the
//! pipeline: the per-transaction output record, the block-tagged result that
//! travels between pipeline stages, and the run metadata written after a
//! successful scan.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::OutputFormat;

/// Schema version for tracking changes
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Ledger block height. Arbitrary ledger quantities are 256-bit on Ethereum.
pub type BlockNumber = U256;

// ============================================================================
// Transaction Record
// ============================================================================

/// A value-bearing transaction as written to the per-block artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Transaction hash, exactly as requested from the ledger
    pub hash: String,

    /// Sender address
    pub from: String,

    /// Hex-encoded call data
    pub input: String,

    /// Sender nonce (hex quantity)
    pub nonce: String,
}

// ============================================================================
// Block Result
// ============================================================================

/// The filtered transactions of one block, tagged with the block they came from.
///
/// The `number` is assigned by the fetcher that resolved the block and is the
/// only thing the sink uses to name the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockResult {
    pub number: BlockNumber,
    pub transactions: Vec<TransactionRecord>,
}

impl BlockResult {
    pub fn new(number: BlockNumber, transactions: Vec<TransactionRecord>) -> Self {
        Self { number, transactions }
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

// ============================================================================
// Metadata Schema
// ============================================================================

/// Run metadata for reproducibility and auditing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Schema version used
    pub schema_version: String,

    /// Pipeline run timestamp
    pub run_timestamp: DateTime<Utc>,

    /// First block of the scanned range (decimal)
    pub start_block: String,

    /// Last block of the scanned range (decimal, inclusive)
    pub end_block: String,

    /// Encoding of the per-block artifacts
    pub output_format: OutputFormat,

    /// Record counts by type
    pub record_counts: RecordCounts,

    /// Pipeline version
    pub pipeline_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub blocks: u64,
    pub transactions: u64,
}

impl RunMetadata {
    pub fn new(start: BlockNumber, end: BlockNumber, output_format: OutputFormat) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_timestamp: Utc::now(),
            start_block: start.to_string(),
            end_block: end.to_string(),
            output_format,
            record_counts: RecordCounts::default(),
            pipeline_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_field_names() {
        let record = TransactionRecord {
            hash: "0xaa".to_string(),
            from: "0xbb".to_string(),
            input: "0x".to_string(),
            nonce: "0x1".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["from", "hash", "input", "nonce"]);
    }

    #[test]
    fn test_run_metadata_uses_decimal_block_numbers() {
        let metadata = RunMetadata::new(U256::from(100u64), U256::from(102u64), OutputFormat::Json);
        assert_eq!(metadata.start_block, "100");
        assert_eq!(metadata.end_block, "102");
        assert_eq!(metadata.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_run_metadata_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_metadata.json");
        let mut metadata = RunMetadata::new(U256::from(1u64), U256::from(1u64), OutputFormat::Parquet);
        metadata.record_counts.blocks = 1;
        metadata.save(&path).unwrap();

        let saved: RunMetadata =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.record_counts.blocks, 1);
        assert_eq!(saved.output_format, OutputFormat::Parquet);
    }
}
