use crate::fetcher::FetchError;
use crate::job::{JobId, JobState};
use crate::planner::PlanError;

/// Errors returned synchronously by `Engine` operations. Failures inside a
/// running pipeline do not surface here; they move the job to `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("job {0} not found")]
    NotFound(JobId),
    /// The command is not legal from the job's current state. Nothing changed.
    #[error("cannot {command} job {id} while it is {state}")]
    InvalidState {
        id: JobId,
        command: &'static str,
        state: JobState,
    },
    #[error("job {id}: {source}")]
    PlanCorruption {
        id: JobId,
        #[source]
        source: PlanError,
    },
    #[error("resolve {handle}: {source}")]
    Source {
        handle: String,
        #[source]
        source: FetchError,
    },
    #[error("invalid request: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, EngineError::InvalidState { .. })
    }
}
