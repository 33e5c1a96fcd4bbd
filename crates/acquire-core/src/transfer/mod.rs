//! Transfer coordination: a bounded pool of range workers over a chunk plan.
//!
//! Workers pull ranges from the `PlanTracker`, fetch them through the
//! `RangeFetcher` and write the bytes at their offset in the preallocated
//! part file. Ranges are disjoint, so writes need no lock; plan transitions
//! go through the tracker one at a time.

mod pool;
mod stats;
mod tracker;

pub use pool::{run_transfer, TransferContext, TransferOutcome};
pub use stats::{eta_seconds, spawn_ticker, LiveStats, SpeedMeter, TransferStats};
pub use tracker::PlanTracker;

use std::io;

use crate::fetcher::FetchError;
use crate::job::FailureCause;
use crate::planner::PlanError;

/// Why a transfer stopped short of completion.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("range {index} rejected by source: {source}")]
    Permanent {
        index: usize,
        #[source]
        source: FetchError,
    },
    #[error("range {index} failed {failures} times: {source}")]
    Exhausted {
        index: usize,
        failures: u32,
        #[source]
        source: FetchError,
    },
    #[error("write to part file failed: {source}")]
    Storage {
        index: Option<usize>,
        #[source]
        source: io::Error,
    },
    #[error("persist chunk state: {0:#}")]
    Persist(anyhow::Error),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("transfer ended with {remaining} bytes outstanding")]
    Incomplete { remaining: u64 },
    #[error("transfer worker panicked")]
    WorkerPanicked,
}

impl TransferError {
    /// Failure cause recorded on the job.
    pub fn cause(&self) -> FailureCause {
        match self {
            TransferError::Permanent { .. } => FailureCause::FetchPermanent,
            TransferError::Exhausted { .. } | TransferError::Incomplete { .. } => {
                FailureCause::FetchExhausted
            }
            TransferError::Plan(_) => FailureCause::PlanCorruption,
            TransferError::Storage { .. }
            | TransferError::Persist(_)
            | TransferError::WorkerPanicked => FailureCause::Storage,
        }
    }
}
