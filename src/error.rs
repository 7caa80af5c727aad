//! Error types surfaced by the pipeline.

use thiserror::Error;

use crate::filter::FilterError;
use crate::rpc::RpcError;
use crate::schemas::BlockNumber;
use crate::sink::SinkError;

/// What went wrong, independent of which block it happened to.
#[derive(Error, Debug)]
pub enum FailureCause {
    #[error("Invalid block range: start {start} is after end {end}")]
    InvalidRange { start: BlockNumber, end: BlockNumber },

    #[error("Transport error: {0}")]
    Transport(#[from] RpcError),

    #[error("Malformed transaction: {0}")]
    MalformedTransaction(#[from] FilterError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] SinkError),

    #[error("Worker pool is shutting down")]
    PoolShutdown,

    #[error("Block worker aborted: {0}")]
    WorkerAborted(String),
}

/// A failure reported to the coordinator, with the block it belongs to when
/// there is one.
#[derive(Error, Debug)]
#[error("{}{}", block_label(.block), .cause)]
pub struct PipelineError {
    pub block: Option<BlockNumber>,
    #[source]
    pub cause: FailureCause,
}

fn block_label(block: &Option<BlockNumber>) -> String {
    match block {
        Some(number) => format!("Block {}: ", number),
        None => String::new(),
    }
}

impl PipelineError {
    /// An error scoped to a single block.
    pub fn for_block(number: BlockNumber, cause: impl Into<FailureCause>) -> Self {
        Self {
            block: Some(number),
            cause: cause.into(),
        }
    }

    /// An error that does not belong to any particular block.
    pub fn unscoped(cause: impl Into<FailureCause>) -> Self {
        Self {
            block: None,
            cause: cause.into(),
        }
    }

    pub fn is_pool_shutdown(&self) -> bool {
        matches!(self.cause, FailureCause::PoolShutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn test_block_scoped_display() {
        let err = PipelineError::for_block(U256::from(102u64), RpcError::NotFound("0xabc".into()));
        let msg = err.to_string();
        assert!(msg.starts_with("Block 102: Transport error"), "{msg}");
    }

    #[test]
    fn test_unscoped_display() {
        let err = PipelineError::unscoped(FailureCause::PoolShutdown);
        assert_eq!(err.to_string(), "Worker pool is shutting down");
        assert!(err.block.is_none());
        assert!(err.is_pool_shutdown());
    }

    #[test]
    fn test_source_is_cause() {
        use std::error::Error as _;
        let err = PipelineError::unscoped(FailureCause::InvalidRange {
            start: U256::from(5u64),
            end: U256::from(4u64),
        });
        let source = err.source().expect("cause is the source");
        assert_eq!(source.to_string(), "Invalid block range: start 5 is after end 4");
    }
}
