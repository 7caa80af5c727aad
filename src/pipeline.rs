//! Pipeline coordinator.
//!
//! Wires the range, the worker pool, the block fetcher and the sink together:
//!
//! ```text
//! BlockRange ──▶ BoundedWorkerPool ──▶ BlockFetcher ──▶ (mpsc) ──▶ sink task
//!                     ▲                     │                        │
//!                     └─── failures (mpsc) ◀┴────────────────────────┘
//! ```
//!
//! Blocks are dispatched in ascending order but complete in any order. Each
//! result carries its own block number to the sink. A block's permit is held
//! until its result has been handed to the sink, so a slow sink slows intake.
//! Failures bypass the sink queue and go straight to the coordinator. The
//! first failure stops intake; work already in flight is allowed to finish
//! and successful blocks are still persisted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::ScanConfig;
use crate::error::{FailureCause, PipelineError};
use crate::fetch_blocks::BlockFetcher;
use crate::ledger::LedgerClient;
use crate::pool::BoundedWorkerPool;
use crate::range::BlockRange;
use crate::schemas::{BlockNumber, BlockResult};
use crate::sink::ResultSink;

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Failed,
    Stopped,
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub start: BlockNumber,
    pub end: BlockNumber,
    pub blocks_written: u64,
    pub records_written: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct SinkReport {
    blocks_written: u64,
    records_written: u64,
}

/// Block tasks still running, keyed by task id.
type InFlight = HashMap<Id, BlockNumber>;

/// Runs one pass over a block range.
pub struct PipelineCoordinator<C, S> {
    fetcher: BlockFetcher<C>,
    sink: Arc<S>,
    pool: BoundedWorkerPool,
    state: watch::Sender<PipelineState>,
}

impl<C, S> PipelineCoordinator<C, S>
where
    C: LedgerClient + 'static,
    S: ResultSink + 'static,
{
    pub fn new(client: Arc<C>, sink: Arc<S>, config: &ScanConfig) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            fetcher: BlockFetcher::new(client, config.fanout_limit()),
            sink,
            pool: BoundedWorkerPool::new(config.concurrency_limit()),
            state,
        }
    }

    /// Observe state transitions of the run.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    fn transition(&self, next: PipelineState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Pipeline state {:?} -> {:?}", previous, next);
        }
    }

    /// Scan `[start, end]`, returning the first error encountered if any.
    pub async fn run(self, start: BlockNumber, end: BlockNumber) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();

        let range = match BlockRange::new(start, end) {
            Ok(range) => range,
            Err(cause) => {
                self.transition(PipelineState::Stopped);
                return Err(PipelineError::unscoped(cause));
            }
        };

        info!(
            "Scanning blocks {} to {} ({} blocks, concurrency {})",
            start,
            end,
            range.len(),
            self.pool.limit()
        );

        let (block_tx, block_rx) = mpsc::channel::<BlockResult>(self.pool.limit());
        let (failure_tx, mut failure_rx) = mpsc::unbounded_channel::<PipelineError>();
        let sink_task = tokio::spawn(drain_blocks(
            Arc::clone(&self.sink),
            block_rx,
            failure_tx.clone(),
        ));

        self.transition(PipelineState::Running);

        let mut workers = JoinSet::new();
        let mut in_flight = InFlight::new();
        let mut first_error: Option<PipelineError> = None;

        for number in range {
            // Wait for a permit while reaping finished blocks and watching for
            // failures.
            let acquired = loop {
                tokio::select! {
                    biased;
                    Some(err) = failure_rx.recv() => {
                        self.record_failure(&mut first_error, err);
                        break None;
                    }
                    Some(joined) = workers.join_next_with_id(), if !workers.is_empty() => {
                        self.reap(joined, &mut in_flight, &mut first_error);
                    }
                    permit = self.pool.acquire() => break Some(permit),
                }
            };
            let permit = match acquired {
                Some(Ok(permit)) => permit,
                Some(Err(err)) => {
                    debug!("Intake stopped before block {}: {}", number, err);
                    break;
                }
                None => break,
            };

            let fetcher = self.fetcher.clone();
            let block_tx = block_tx.clone();
            let failure_tx = failure_tx.clone();
            let handle = workers.spawn(async move {
                match fetcher.fetch_block(number).await {
                    // The permit stays held until the sink has room for the block.
                    Ok(block) => {
                        if block_tx.send(block).await.is_err() {
                            warn!("Result for block {} dropped: sink is gone", number);
                        }
                    }
                    Err(err) => {
                        if failure_tx.send(err).is_err() {
                            warn!("Failure for block {} dropped: coordinator is gone", number);
                        }
                    }
                }
                drop(permit);
            });
            in_flight.insert(handle.id(), number);
        }
        drop(block_tx);
        drop(failure_tx);

        if first_error.is_none() {
            self.transition(PipelineState::Draining);
        }

        // Let in-flight blocks finish while still listening for failures.
        loop {
            tokio::select! {
                Some(err) = failure_rx.recv() => self.record_failure(&mut first_error, err),
                joined = workers.join_next_with_id() => match joined {
                    Some(joined) => self.reap(joined, &mut in_flight, &mut first_error),
                    None => break,
                },
            }
        }

        let report = match sink_task.await {
            Ok(report) => report,
            Err(e) => {
                self.record_failure(
                    &mut first_error,
                    PipelineError::unscoped(FailureCause::WorkerAborted(e.to_string())),
                );
                SinkReport::default()
            }
        };

        // Every sender is gone now, so this drains whatever is still queued.
        while let Some(err) = failure_rx.recv().await {
            self.record_failure(&mut first_error, err);
        }

        self.pool.shutdown();
        self.transition(PipelineState::Stopped);

        if let Some(err) = first_error {
            error!(
                "Run stopped after {:?}: {} blocks written before failure",
                started.elapsed(),
                report.blocks_written
            );
            return Err(err);
        }

        let summary = RunSummary {
            start,
            end,
            blocks_written: report.blocks_written,
            records_written: report.records_written,
            elapsed: started.elapsed(),
        };
        info!(
            "Scan complete: {} blocks, {} transactions in {:?}",
            summary.blocks_written, summary.records_written, summary.elapsed
        );
        Ok(summary)
    }

    /// Account for a finished block task. A task that panicked or was
    /// cancelled fails its block.
    fn reap(
        &self,
        joined: Result<(Id, ()), JoinError>,
        in_flight: &mut InFlight,
        first_error: &mut Option<PipelineError>,
    ) {
        match joined {
            Ok((id, ())) => {
                in_flight.remove(&id);
            }
            Err(e) => {
                let cause = FailureCause::WorkerAborted(e.to_string());
                let err = match in_flight.remove(&e.id()) {
                    Some(number) => PipelineError::for_block(number, cause),
                    None => PipelineError::unscoped(cause),
                };
                self.record_failure(first_error, err);
            }
        }
    }

    fn enter_failed(&self) {
        self.pool.shutdown();
        self.transition(PipelineState::Failed);
    }

    /// First error wins; later ones are only logged.
    fn record_failure(&self, first_error: &mut Option<PipelineError>, err: PipelineError) {
        if first_error.is_none() {
            error!("{}", err);
            *first_error = Some(err);
            self.enter_failed();
        } else {
            warn!("Additional failure after run already failed: {}", err);
        }
    }
}

/// Sink side of the pipeline: persists every block it receives and reports
/// write failures to the coordinator.
async fn drain_blocks<S: ResultSink>(
    sink: Arc<S>,
    mut blocks: mpsc::Receiver<BlockResult>,
    failures: mpsc::UnboundedSender<PipelineError>,
) -> SinkReport {
    let mut report = SinkReport::default();

    while let Some(block) = blocks.recv().await {
        let number = block.number;
        let records = block.transactions.len() as u64;
        match sink.persist(block).await {
            Ok(path) => {
                report.blocks_written += 1;
                report.records_written += records;
                info!("Transactions for block {} saved to {:?}", number, path);
            }
            Err(e) => {
                if failures.send(PipelineError::for_block(number, e)).is_err() {
                    warn!("Coordinator is gone; dropping failure report");
                }
            }
        }
    }

    report
}
