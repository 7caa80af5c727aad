//! The interface the pipeline uses to read blocks and transactions from a
//! ledger.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;

use crate::rpc::RpcError;
use crate::schemas::BlockNumber;

/// Transaction fields the scanner needs, as returned by the ledger.
///
/// Every field is optional on the wire; the filter decides what a missing
/// field means.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransactionDetail {
    pub from: Option<String>,
    pub input: Option<String>,
    pub nonce: Option<String>,
    pub value: Option<String>,
}

/// A remote ledger that can be queried block by block.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Returns the hashes of the transactions included in `number`, in block
    /// order.
    async fn get_block(&self, number: BlockNumber) -> Result<Vec<String>, RpcError>;

    /// Returns the detail of a single transaction.
    async fn get_transaction(&self, hash: &str) -> Result<TransactionDetail, RpcError>;
}

