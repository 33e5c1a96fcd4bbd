//! One run of a job: download the pending ranges, verify, finalize, extract.
//!
//! Each phase boundary is a compare-and-set on the job state. A pause or
//! cancel flips the abort token and moves the state first, so a failed
//! boundary CAS just means "stop here"; it is never an error.

use std::fmt;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;

use super::Inner;
use crate::control::AbortToken;
use crate::job::{ChecksumState, FailureCause, JobId, JobRecord, Transition};
use crate::planner::ChunkPlan;
use crate::stager::{self, StagingOptions};
use crate::storage::{self, PartFile};
use crate::transfer::{
    run_transfer, spawn_ticker, LiveStats, PlanTracker, TransferContext, TransferOutcome,
};
use crate::verify::{self, Verification, VerifyError};

/// A reason to move the job to `Failed`.
struct Failure {
    cause: FailureCause,
    detail: String,
}

impl Failure {
    fn new(cause: FailureCause, detail: impl fmt::Display) -> Self {
        Self {
            cause,
            detail: detail.to_string(),
        }
    }

    fn storage(detail: impl fmt::Display) -> Self {
        Self::new(FailureCause::Storage, detail)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(e: anyhow::Error) -> Self {
        Self::storage(format!("{e:#}"))
    }
}

enum Finish {
    Completed,
    Stopped(&'static str),
}

struct Pipeline {
    inner: Arc<Inner>,
    id: JobId,
    token: AbortToken,
    stats: Arc<LiveStats>,
}

pub(super) async fn run(
    inner: Arc<Inner>,
    id: JobId,
    token: AbortToken,
    stats: Arc<LiveStats>,
    done: watch::Sender<bool>,
) {
    let pipeline = Pipeline {
        inner: Arc::clone(&inner),
        id,
        token: Arc::clone(&token),
        stats: Arc::clone(&stats),
    };
    match pipeline.drive().await {
        Ok(Finish::Completed) => tracing::info!(job = id, "job completed"),
        Ok(Finish::Stopped(phase)) => tracing::info!(job = id, phase, "pipeline stopped"),
        Err(f) => {
            tracing::error!(job = id, cause = %f.cause, "job failed: {}", f.detail);
            match inner.store.fail_job(id, f.cause, &f.detail).await {
                Ok(true) => {}
                Ok(false) => tracing::debug!(job = id, "state moved on; failure not recorded"),
                Err(e) => tracing::error!(job = id, "record failure: {e:#}"),
            }
        }
    }
    stats.settle();
    inner.control.unregister(id, &token);
    done.send_replace(true);
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

impl Pipeline {
    fn stopped(&self) -> bool {
        self.token.load(Ordering::SeqCst)
    }

    async fn advance(&self, t: Transition) -> Result<bool, Failure> {
        if self.stopped() {
            return Ok(false);
        }
        Ok(self.inner.store.apply_transition(self.id, t).await?)
    }

    async fn drive(&self) -> Result<Finish, Failure> {
        let store = &self.inner.store;
        let rec = store
            .get_job(self.id)
            .await?
            .ok_or_else(|| Failure::storage(format!("job {} vanished from the store", self.id)))?;
        let plan = store
            .load_plan(self.id, rec.total_size, rec.chunk_size)
            .await?
            .map_err(|e| Failure::new(FailureCause::PlanCorruption, e))?;

        if !self.download(&rec, plan).await? {
            return Ok(Finish::Stopped("downloading"));
        }
        if !self.advance(Transition::VERIFY).await? {
            return Ok(Finish::Stopped("downloading"));
        }
        tracing::info!(job = self.id, "all ranges done, verifying");

        if !self.verify(&rec).await? {
            return Ok(Finish::Stopped("verifying"));
        }
        if !self.advance(Transition::EXTRACT).await? {
            return Ok(Finish::Stopped("verifying"));
        }

        if !self.stage(&rec).await? {
            return Ok(Finish::Stopped("extracting"));
        }
        if !self.advance(Transition::COMPLETE).await? {
            return Ok(Finish::Stopped("extracting"));
        }
        Ok(Finish::Completed)
    }

    /// Fetch every range that is not Done. Returns false when aborted.
    async fn download(&self, rec: &JobRecord, plan: ChunkPlan) -> Result<bool, Failure> {
        let part = rec.part_path();
        if plan.is_complete() {
            if exists(&part).await || exists(&rec.archive_path()).await {
                return Ok(true);
            }
            if rec.total_size > 0 {
                return Err(Failure::storage(format!(
                    "{} is missing although every range is recorded as done",
                    part.display()
                )));
            }
        }

        tokio::fs::create_dir_all(&rec.destination)
            .await
            .map_err(|e| Failure::storage(format!("create {}: {e}", rec.destination.display())))?;

        let done = plan.done_bytes();
        if done > 0 && !exists(&part).await {
            return Err(Failure::storage(format!(
                "{} is missing but {done} bytes are recorded as downloaded",
                part.display()
            )));
        }
        if done > 0 {
            tracing::info!(job = self.id, done, total = rec.total_size, "resuming from persisted plan");
        }

        let cfg = &self.inner.config;
        self.stats.set_done_bytes(done);
        let ticker = spawn_ticker(
            Arc::clone(&self.stats),
            rec.total_size,
            cfg.progress_tick(),
            cfg.speed_smoothing,
        );
        let tracker = Arc::new(PlanTracker::new(
            self.id,
            plan,
            self.inner.store.clone(),
            Handle::current(),
            cfg.max_chunk_failures,
        ));
        let job_id = self.id;
        let handle = rec.source.clone();
        let total_size = rec.total_size;
        let fetcher = self.inner.fetcher.clone();
        let workers = cfg.effective_workers();
        let abort = Arc::clone(&self.token);
        let stats = Arc::clone(&self.stats);

        let joined = tokio::task::spawn_blocking(move || -> Result<TransferOutcome, Failure> {
            let file = open_part(&part, total_size, done)?;
            run_transfer(TransferContext {
                job_id,
                handle,
                total_size,
                fetcher,
                file,
                tracker,
                workers,
                abort,
                stats,
            })
            .map_err(|e| Failure::new(e.cause(), e))
        })
        .await;
        ticker.abort();
        self.stats.settle();

        let outcome = joined.map_err(|e| Failure::storage(format!("transfer task: {e}")))??;
        Ok(outcome == TransferOutcome::Completed)
    }

    /// Digest the assembled file and compare it with the expected value,
    /// then move the part file to its final name. Returns false when aborted.
    async fn verify(&self, rec: &JobRecord) -> Result<bool, Failure> {
        let store = &self.inner.store;
        let part = rec.part_path();
        let archive = rec.archive_path();
        let renamed = !exists(&part).await;
        let target = if renamed { archive.clone() } else { part.clone() };
        if renamed && !exists(&archive).await {
            return Err(Failure::storage(format!("{} is missing", part.display())));
        }

        store
            .set_checksum(self.id, ChecksumState::Calculating, None)
            .await?;
        let expected = rec.expected_digest.clone();
        let token = Arc::clone(&self.token);
        let buf_size = self.inner.config.verify_buffer_bytes;
        let checked = tokio::task::spawn_blocking(move || {
            let cancelled = || token.load(Ordering::SeqCst);
            match expected {
                Some(exp) => verify::verify(&target, &exp, buf_size, &cancelled).map(|v| match v {
                    Verification::Match { digest } => Checked::Verified(digest),
                    Verification::Mismatch { expected, actual } => {
                        Checked::Mismatch { expected, actual }
                    }
                }),
                None => verify::digest_file(&target, buf_size, &cancelled, &mut |_| {})
                    .map(Checked::Computed),
            }
        })
        .await
        .map_err(|e| Failure::storage(format!("verify task: {e}")))?;

        match checked {
            Err(VerifyError::Aborted) => {
                store.set_checksum(self.id, ChecksumState::Pending, None).await?;
                return Ok(false);
            }
            Err(e) => return Err(Failure::storage(e)),
            Ok(Checked::Mismatch { expected, actual }) => {
                store
                    .set_checksum(self.id, ChecksumState::Mismatch, Some(&actual))
                    .await?;
                return Err(Failure::new(
                    FailureCause::IntegrityFailure,
                    format!("sha256 mismatch: expected {expected}, got {actual}"),
                ));
            }
            Ok(Checked::Verified(digest)) => {
                tracing::info!(job = self.id, %digest, "sha256 verified");
                store
                    .set_checksum(self.id, ChecksumState::Verified, Some(&digest))
                    .await?;
            }
            Ok(Checked::Computed(digest)) => {
                tracing::info!(job = self.id, %digest, "no expected digest; sha256 recorded");
                store
                    .set_checksum(self.id, ChecksumState::Computed, Some(&digest))
                    .await?;
            }
        }

        if !renamed {
            storage::finalize(&part, &archive)?;
        }
        Ok(true)
    }

    /// Extract the archive into the job's staging directory. Returns false
    /// when aborted.
    async fn stage(&self, rec: &JobRecord) -> Result<bool, Failure> {
        let archive = rec.archive_path();
        let dest = rec.staging_dir();
        let opts = StagingOptions {
            buffer_size: self.inner.config.verify_buffer_bytes,
            entry_retries: self.inner.config.staging_entry_retries,
        };
        let token = Arc::clone(&self.token);
        let stats = Arc::clone(&self.stats);
        let staged = tokio::task::spawn_blocking(move || {
            stager::extract(
                &archive,
                &dest,
                &opts,
                &|| token.load(Ordering::SeqCst),
                &mut |p| stats.set_staging(p),
            )
        })
        .await
        .map_err(|e| Failure::storage(format!("staging task: {e}")))?;

        let result = match staged {
            Err(stager::StagingError::Aborted) => return Ok(false),
            Err(e) => return Err(Failure::new(FailureCause::StagingError, e)),
            Ok(result) => result,
        };
        self.inner.store.record_staging(self.id, &result).await?;
        if !result.is_success() {
            let failed: Vec<String> = result
                .failed()
                .map(|e| match &e.outcome {
                    stager::EntryOutcome::Failed(why) => format!("{}: {why}", e.name),
                    _ => e.name.clone(),
                })
                .collect();
            return Err(Failure::new(
                FailureCause::StagingError,
                format!(
                    "{} of {} entries failed: {}",
                    failed.len(),
                    result.entries.len(),
                    failed.join("; ")
                ),
            ));
        }
        Ok(true)
    }
}

enum Checked {
    Verified(String),
    Computed(String),
    Mismatch { expected: String, actual: String },
}

/// Open the part file for a run: fresh and preallocated when nothing is
/// done yet, otherwise the existing file with its finished ranges intact.
fn open_part(path: &Path, total_size: u64, done_bytes: u64) -> anyhow::Result<PartFile> {
    if done_bytes == 0 {
        PartFile::create_preallocated(path, total_size)
    } else {
        PartFile::open_existing(path, total_size)
    }
}
