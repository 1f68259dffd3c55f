//! A single polling worker and the heuristic it uses to decide the source
//! queue is drained.

use crate::queue::{QueueError, QueueService};
use crate::transfer::{dispatch_batch, BatchSummary, Route};
use std::fmt;

/// Number of empty receives in a row after which a drainer considers the
/// source empty. One empty receive can just mean messages are in flight.
pub const DRAINED_AFTER_EMPTY_RECEIVES: u32 = 2;

/// What a drainer does after looking at a received batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Non-empty batch: move it, then poll again
    Dispatch,
    /// Empty batch, but not enough of them in a row yet
    PollAgain,
    /// The source is judged drained; the drainer stops for good
    Drained,
}

/// Termination state owned by exactly one drainer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerState {
    consecutive_empty_batches: u32,
}

impl WorkerState {
    pub fn observe(&mut self, batch_len: usize) -> Transition {
        if batch_len > 0 {
            self.consecutive_empty_batches = 0;
            return Transition::Dispatch;
        }

        self.consecutive_empty_batches += 1;
        if self.consecutive_empty_batches >= DRAINED_AFTER_EMPTY_RECEIVES {
            Transition::Drained
        } else {
            Transition::PollAgain
        }
    }

    pub fn consecutive_empty_batches(&self) -> u32 {
        self.consecutive_empty_batches
    }
}

/// What one drainer did before it stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct DrainReport {
    pub worker: usize,
    pub receives: usize,
    pub batches: usize,
    #[serde(flatten)]
    pub outcomes: BatchSummary,
}

/// A receive failed, which ends the drainer.
#[derive(Debug)]
pub struct DrainError {
    pub worker: usize,
    pub source: QueueError,
    /// Work done before the failure
    pub report: DrainReport,
}

impl fmt::Display for DrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker {} stopped: {}", self.worker, self.source)
    }
}

impl std::error::Error for DrainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

pub struct Drainer<Q> {
    worker: usize,
    route: Route<Q>,
    state: WorkerState,
}

impl<Q: QueueService + 'static> Drainer<Q> {
    pub fn new(worker: usize, route: Route<Q>) -> Self {
        Self {
            worker,
            route,
            state: WorkerState::default(),
        }
    }

    /// Polls and moves batches until the source looks drained.
    ///
    /// Once drained the drainer never polls again, even if new messages
    /// arrive. A receive error is returned immediately without retrying.
    pub async fn run(mut self) -> Result<DrainReport, DrainError> {
        let mut report = DrainReport {
            worker: self.worker,
            ..DrainReport::default()
        };

        loop {
            report.receives += 1;
            let batch = match self.route.source.receive_batch(&self.route.request).await {
                Ok(batch) => batch,
                Err(source) => {
                    log::error!("[worker {}] receive failed: {}", self.worker, source);
                    return Err(DrainError {
                        worker: self.worker,
                        source,
                        report,
                    });
                }
            };

            log::info!("[worker {}] received {} messages...", self.worker, batch.len());

            match self.state.observe(batch.len()) {
                Transition::Dispatch => {
                    report.batches += 1;
                    let outcomes = dispatch_batch(&self.route, batch).await;
                    report.outcomes.merge(outcomes.iter().collect());
                }
                Transition::PollAgain => continue,
                Transition::Drained => {
                    log::info!("[worker {}] done", self.worker);
                    return Ok(report);
                }
            }
        }
    }
}
