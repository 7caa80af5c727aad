//! Permit pool bounding the number of blocks processed at once.

use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{FailureCause, PipelineError};

/// Caps the number of block units of work in flight.
///
/// A unit starts when a permit is acquired and ends when the returned
/// [`BlockPermit`] is dropped, so the holder decides how much work the permit
/// covers.
#[derive(Debug, Clone)]
pub struct BoundedWorkerPool {
    permits: Arc<Semaphore>,
    limit: NonZeroUsize,
}

/// A held slot in the pool. Released on drop.
#[derive(Debug)]
pub struct BlockPermit {
    _permit: OwnedSemaphorePermit,
}

impl BoundedWorkerPool {
    pub fn new(limit: NonZeroUsize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit.get())),
            limit,
        }
    }

    /// Wait for a free slot.
    ///
    /// Fails with [`FailureCause::PoolShutdown`] once [`shutdown`](Self::shutdown)
    /// has been called, including for callers already waiting.
    pub async fn acquire(&self) -> Result<BlockPermit, PipelineError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::unscoped(FailureCause::PoolShutdown))?;
        Ok(BlockPermit { _permit: permit })
    }

    /// Refuse all further acquisitions. Permits already handed out stay valid.
    pub fn shutdown(&self) {
        if !self.permits.is_closed() {
            debug!("Shutting down worker pool ({} in flight)", self.in_flight());
            self.permits.close();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.permits.is_closed()
    }

    pub fn limit(&self) -> usize {
        self.limit.get()
    }

    /// Number of permits currently held.
    pub fn in_flight(&self) -> usize {
        self.limit.get().saturating_sub(self.permits.available_permits())
    }
}
