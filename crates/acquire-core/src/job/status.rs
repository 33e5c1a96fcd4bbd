use std::path::PathBuf;

use super::{ChecksumState, FailureCause, JobId, JobState};
use crate::planner::progress_percent;
use crate::url_model;

/// Full persisted job row.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub source: String,
    pub destination: PathBuf,
    pub filename: String,
    pub total_size: u64,
    pub chunk_size: u64,
    pub expected_digest: Option<String>,
    pub state: JobState,
    pub failure: Option<(FailureCause, String)>,
    pub checksum_state: ChecksumState,
    pub checksum_value: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl JobRecord {
    /// Where ranges are written while the job downloads.
    pub fn part_path(&self) -> PathBuf {
        crate::storage::temp_path(&self.archive_path())
    }

    /// The verified archive.
    pub fn archive_path(&self) -> PathBuf {
        self.destination.join(&self.filename)
    }

    /// Directory the archive is extracted into.
    pub fn staging_dir(&self) -> PathBuf {
        self.destination
            .join(url_model::staging_dir_name(&self.filename))
    }
}

/// One line of `listJobs`.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub id: JobId,
    pub source: String,
    pub filename: String,
    pub state: JobState,
    pub total_size: u64,
    pub downloaded_bytes: u64,
    pub failure: Option<FailureCause>,
}

impl JobSummary {
    pub fn progress_percent(&self) -> f64 {
        progress_percent(self.downloaded_bytes, self.total_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StagingProgress {
    pub entries_done: u64,
    pub entries_total: u64,
}

/// Snapshot returned by `Engine::status`. Built from persisted state plus the
/// last transfer-stats tick; never waits on an in-flight fetch.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    pub progress_percent: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub speed_bps: f64,
    /// `None` while the smoothed speed is zero.
    pub eta_seconds: Option<u64>,
    pub checksum_state: ChecksumState,
    pub checksum_value: Option<String>,
    pub failure: Option<(FailureCause, String)>,
    pub staging: Option<StagingProgress>,
}
