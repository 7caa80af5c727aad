//! Resolves a block number into its filtered, block-tagged transaction set.
//!
//! The block's transaction hashes are fetched first, then every transaction's
//! detail is fetched concurrently. Results are reassembled in block order no
//! matter in which order the detail requests complete.

use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::error::{FailureCause, PipelineError};
use crate::filter::filter_transaction;
use crate::ledger::LedgerClient;
use crate::schemas::{BlockNumber, BlockResult, TransactionRecord};

/// Fetches whole blocks through a [`LedgerClient`].
pub struct BlockFetcher<C> {
    client: Arc<C>,
    transaction_fanout: NonZeroUsize,
}

impl<C> Clone for BlockFetcher<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            transaction_fanout: self.transaction_fanout,
        }
    }
}

impl<C: LedgerClient> BlockFetcher<C> {
    pub fn new(client: Arc<C>, transaction_fanout: NonZeroUsize) -> Self {
        Self {
            client,
            transaction_fanout,
        }
    }

    /// Fetch one block and all of its transactions.
    ///
    /// Either every transaction of the block is fetched and filtered, or the
    /// whole block fails; there are no partial results. When several
    /// transactions fail, the first one in block order is reported.
    #[tracing::instrument(skip_all, level = "debug", fields(block = %number))]
    pub async fn fetch_block(&self, number: BlockNumber) -> Result<BlockResult, PipelineError> {
        let hashes = self
            .client
            .get_block(number)
            .await
            .map_err(|e| PipelineError::for_block(number, e))?;

        debug!("Block {} has {} transactions", number, hashes.len());

        // `buffered` yields in input order, so the collected outcomes line up
        // with `hashes` even though requests complete out of order.
        let outcomes: Vec<Result<Option<TransactionRecord>, FailureCause>> = stream::iter(hashes)
            .map(|hash| self.fetch_transaction(hash))
            .buffered(self.transaction_fanout.get())
            .collect()
            .await;

        let mut transactions = Vec::with_capacity(outcomes.len());
        let mut first_error = None;
        let mut failed = 0usize;
        for outcome in outcomes {
            match outcome {
                Ok(Some(record)) => transactions.push(record),
                Ok(None) => {}
                Err(cause) => {
                    failed += 1;
                    if first_error.is_none() {
                        first_error = Some(cause);
                    }
                }
            }
        }

        if let Some(cause) = first_error {
            if failed > 1 {
                warn!(
                    "Block {}: {} transaction fetches failed, reporting the first",
                    number, failed
                );
            }
            return Err(PipelineError::for_block(number, cause));
        }

        debug!(
            "Block {} resolved: {} value-bearing transactions",
            number,
            transactions.len()
        );
        Ok(BlockResult::new(number, transactions))
    }

    async fn fetch_transaction(
        &self,
        hash: String,
    ) -> Result<Option<TransactionRecord>, FailureCause> {
        let detail = self.client.get_transaction(&hash).await?;
        Ok(filter_transaction(&hash, detail)?)
    }
}
