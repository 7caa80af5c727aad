//! Ethereum Block Scanner Library
//!
//! Scans an inclusive range of Ethereum blocks concurrently and writes the
//! value-bearing transactions of every block to its own artifact.
//!
//! # Pipeline Stages
//!
//! 1. **Range** ([`range`]): Yields block numbers in ascending order
//! 2. **Pool** ([`pool`]): Bounds how many blocks are in flight
//! 3. **Fetch** ([`fetch_blocks`]): Resolves a block and fans out over its transactions
//! 4. **Filter** ([`filter`]): Keeps transactions with a non-zero value
//! 5. **Sink** ([`sink`]): Persists one artifact per block, named by block number
//!
//! The [`pipeline`] module wires the stages together and stops the run on the
//! first error.
//!
//! # Output Files
//!
//! - `tx_block_<number>.json` or `tx_block_<number>.parquet`: One per block
//! - `run_metadata.json`: Written by the CLI after a successful run
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use alloy_primitives::U256;
//! use eth_block_scanner::config::PipelineConfig;
//! use eth_block_scanner::pipeline::PipelineCoordinator;
//! use eth_block_scanner::rpc::EthRpcClient;
//! use eth_block_scanner::sink::BlockFileSink;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::load()?;
//!     let client = Arc::new(EthRpcClient::new(&config.rpc)?);
//!     let sink = Arc::new(BlockFileSink::new(&config.output.dir, config.output.format));
//!     let summary = PipelineCoordinator::new(client, sink, &config.scan)
//!         .run(U256::from(100u64), U256::from(102u64))
//!         .await?;
//!     println!("Wrote {} blocks", summary.blocks_written);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fetch_blocks;
pub mod filter;
pub mod ledger;
pub mod pipeline;
pub mod pool;
pub mod range;
pub mod rpc;
pub mod schemas;
pub mod sink;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{FailureCause, PipelineError};
pub use pipeline::{PipelineCoordinator, PipelineState, RunSummary};
pub use schemas::{BlockNumber, BlockResult, RunMetadata, TransactionRecord};
