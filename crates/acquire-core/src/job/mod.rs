//! Job identity, lifecycle states and the status view.

mod command;
mod status;

pub use command::{Command, Transition};
pub use status::{JobRecord, JobStatus, JobSummary, StagingProgress};

use std::fmt;

/// Job identifier (SQLite rowid).
pub type JobId = i64;

/// Lifecycle state, stored as text in the `jobs` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Created,
    Downloading,
    Paused,
    Verifying,
    Extracting,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub const ALL: [JobState; 8] = [
        JobState::Created,
        JobState::Downloading,
        JobState::Paused,
        JobState::Verifying,
        JobState::Extracting,
        JobState::Completed,
        JobState::Failed,
        JobState::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Downloading => "downloading",
            JobState::Paused => "paused",
            JobState::Verifying => "verifying",
            JobState::Extracting => "extracting",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// States a pipeline task is actively working in.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            JobState::Downloading | JobState::Verifying | JobState::Extracting
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job ended in `Failed`. Kept with the job so it stays inspectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    /// The source definitively rejected a request (not found, forbidden).
    FetchPermanent,
    /// A range kept failing after retries until its failure ceiling.
    FetchExhausted,
    /// The persisted chunk plan no longer partitions the file.
    PlanCorruption,
    /// The assembled file does not match the expected digest.
    IntegrityFailure,
    /// One or more archive entries could not be extracted.
    StagingError,
    /// Local file system error on the download target.
    Storage,
}

impl FailureCause {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureCause::FetchPermanent => "fetch_permanent",
            FailureCause::FetchExhausted => "fetch_exhausted",
            FailureCause::PlanCorruption => "plan_corruption",
            FailureCause::IntegrityFailure => "integrity_failure",
            FailureCause::StagingError => "staging_error",
            FailureCause::Storage => "storage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            FailureCause::FetchPermanent,
            FailureCause::FetchExhausted,
            FailureCause::PlanCorruption,
            FailureCause::IntegrityFailure,
            FailureCause::StagingError,
            FailureCause::Storage,
        ]
        .into_iter()
        .find(|c| c.as_str() == s)
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checksum progress as shown in the status view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumState {
    #[default]
    Pending,
    Calculating,
    /// Digest computed and equal to the expected one.
    Verified,
    /// Digest computed; there was nothing to compare it with.
    Computed,
    Mismatch,
}

impl ChecksumState {
    pub fn as_str(self) -> &'static str {
        match self {
            ChecksumState::Pending => "pending",
            ChecksumState::Calculating => "calculating",
            ChecksumState::Verified => "verified",
            ChecksumState::Computed => "computed",
            ChecksumState::Mismatch => "mismatch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ChecksumState::Pending),
            "calculating" => Some(ChecksumState::Calculating),
            "verified" => Some(ChecksumState::Verified),
            "computed" => Some(ChecksumState::Computed),
            "mismatch" => Some(ChecksumState::Mismatch),
            _ => None,
        }
    }
}

impl fmt::Display for ChecksumState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
