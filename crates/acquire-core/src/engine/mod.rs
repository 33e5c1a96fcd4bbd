//! The acquisition engine.
//!
//! Owns the job store, the range source and a registry of running
//! pipelines. Every command is checked against the job's state and applied
//! as a compare-and-set, so illegal or racing commands fail with
//! `InvalidState` and change nothing. Control commands for all jobs are
//! serialized on one async mutex; status reads never take it.

mod error;
mod pipeline;

pub use error::EngineError;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::AcquireConfig;
use crate::control::JobControl;
use crate::fetcher::{RangeFetcher, RangeSource};
use crate::job::{
    Command, JobId, JobRecord, JobState, JobStatus, JobSummary, StagingProgress, Transition,
};
use crate::planner::ChunkPlan;
use crate::stager;
use crate::store::{JobStore, NewJob};
use crate::transfer::LiveStats;
use crate::url_model;
use crate::verify::normalize_digest;

/// Optional overrides for `Engine::submit_with`.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// SHA-256 the archive must match. Falls back to a digest advertised by
    /// the source, if any.
    pub expected_digest: Option<String>,
    /// Range size for this job; defaults to `chunk_size_bytes` from config.
    pub chunk_size: Option<u64>,
    /// Local archive name; defaults to the name the source reports.
    pub filename: Option<String>,
}

pub(crate) struct Inner {
    store: JobStore,
    fetcher: RangeFetcher,
    config: AcquireConfig,
    control: JobControl,
    live: RwLock<HashMap<JobId, Arc<LiveStats>>>,
}

struct RunningJob {
    handle: JoinHandle<()>,
    done: watch::Receiver<bool>,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
    running: Arc<Mutex<HashMap<JobId, RunningJob>>>,
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

async fn remove_file(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl Engine {
    /// Build an engine over `store`. Jobs a crashed process left mid-pipeline
    /// are moved to `Paused` first.
    pub async fn open(
        store: JobStore,
        source: Arc<dyn RangeSource>,
        config: AcquireConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let recovered = store.recover_interrupted_jobs().await?;
        if recovered > 0 {
            tracing::info!(recovered, "paused jobs interrupted by a previous run");
        }
        Self::attach(store, source, config)
    }

    /// Like `open`, but without crash recovery: for a process that shares the
    /// store with another engine whose pipelines are still running.
    pub fn attach(
        store: JobStore,
        source: Arc<dyn RangeSource>,
        config: AcquireConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let fetcher = RangeFetcher::new(source, config.retry_policy());
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                fetcher,
                config,
                control: JobControl::new(),
                live: RwLock::new(HashMap::new()),
            }),
            running: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &AcquireConfig {
        &self.inner.config
    }

    async fn require(&self, id: JobId) -> Result<JobRecord, EngineError> {
        self.inner
            .store
            .get_job(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    async fn current_state(&self, id: JobId) -> Result<JobState, EngineError> {
        self.inner
            .store
            .job_state(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    async fn rejected(&self, id: JobId, cmd: Command) -> EngineError {
        match self.current_state(id).await {
            Ok(state) => EngineError::InvalidState {
                id,
                command: cmd.name(),
                state,
            },
            Err(e) => e,
        }
    }

    /// Resolve `handle` and record a new job in `Created`.
    pub async fn submit(
        &self,
        handle: &str,
        destination: impl AsRef<Path>,
    ) -> Result<JobId, EngineError> {
        self.submit_with(handle, destination, SubmitOptions::default())
            .await
    }

    pub async fn submit_with(
        &self,
        handle: &str,
        destination: impl AsRef<Path>,
        opts: SubmitOptions,
    ) -> Result<JobId, EngineError> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(EngineError::InvalidInput("empty source handle".into()));
        }
        let chunk_size = opts.chunk_size.unwrap_or(self.inner.config.chunk_size_bytes);
        if chunk_size == 0 {
            return Err(EngineError::InvalidInput("chunk size must be positive".into()));
        }
        let expected = opts.expected_digest.as_deref().map(normalize_digest);
        if let Some(d) = expected.as_deref().filter(|d| !is_sha256_hex(d)) {
            return Err(EngineError::InvalidInput(format!(
                "expected digest {d:?} is not a SHA-256 hex string"
            )));
        }

        let fetcher = self.inner.fetcher.clone();
        let owned = handle.to_string();
        let info = tokio::task::spawn_blocking(move || fetcher.resolve(&owned))
            .await
            .map_err(anyhow::Error::from)?
            .map_err(|source| EngineError::Source {
                handle: handle.to_string(),
                source,
            })?;

        let sanitized = |name: &str| Some(url_model::sanitize_component(name)).filter(|s| !s.is_empty());
        let filename = opts
            .filename
            .as_deref()
            .and_then(sanitized)
            .or_else(|| info.filename.as_deref().and_then(sanitized))
            .unwrap_or_else(|| url_model::derive_filename(handle, None));
        let expected_digest = expected.or_else(|| {
            info.digest
                .as_deref()
                .map(normalize_digest)
                .filter(|d| is_sha256_hex(d))
        });

        let job = NewJob {
            source: handle.to_string(),
            destination: destination.as_ref().to_path_buf(),
            filename,
            total_size: info.total_size,
            chunk_size,
            expected_digest,
        };
        let plan = ChunkPlan::new(job.total_size, chunk_size);
        let id = self.inner.store.insert_job(&job, &plan).await?;
        tracing::info!(
            job = id,
            source = handle,
            total = job.total_size,
            chunks = plan.len(),
            "job submitted as {}",
            job.filename
        );
        Ok(id)
    }

    /// `Created` or `Paused` -> `Downloading`. Rejected while a pipeline runs.
    pub async fn start(&self, id: JobId) -> Result<(), EngineError> {
        self.launch(id, Command::Start).await
    }

    /// `Paused` -> `Downloading`; only Pending ranges are fetched.
    pub async fn resume(&self, id: JobId) -> Result<(), EngineError> {
        self.launch(id, Command::Resume).await
    }

    async fn launch(&self, id: JobId, cmd: Command) -> Result<(), EngineError> {
        let Some(transition) = Transition::for_command(cmd) else {
            return Err(EngineError::InvalidInput(format!("{} does not start a job", cmd.name())));
        };
        let mut running = self.running.lock().await;
        let rec = self.require(id).await?;
        if !cmd.accepts(rec.state) {
            return Err(EngineError::InvalidState {
                id,
                command: cmd.name(),
                state: rec.state,
            });
        }
        // A paused pipeline may still be unwinding; it must be gone before a
        // new one touches the plan.
        if let Some(old) = running.remove(&id) {
            if let Err(e) = old.handle.await {
                tracing::warn!(job = id, "previous pipeline ended abnormally: {e}");
            }
        }

        let token = self.inner.control.register(id);
        if !self.inner.store.apply_transition(id, transition).await? {
            self.inner.control.unregister(id, &token);
            return Err(self.rejected(id, cmd).await);
        }

        let stats = Arc::new(LiveStats::new(self.inner.store.done_bytes(id).await?));
        self.inner
            .live
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::clone(&stats));
        let (done_tx, done_rx) = watch::channel(false);
        let handle = tokio::spawn(pipeline::run(
            Arc::clone(&self.inner),
            id,
            token,
            stats,
            done_tx,
        ));
        running.insert(
            id,
            RunningJob {
                handle,
                done: done_rx,
            },
        );
        tracing::info!(job = id, command = cmd.name(), "pipeline started");
        Ok(())
    }

    /// Stop issuing fetches; returns once in-flight ranges have finished or
    /// been put back to Pending.
    pub async fn pause(&self, id: JobId) -> Result<(), EngineError> {
        let mut running = self.running.lock().await;
        let rec = self.require(id).await?;
        if !Command::Pause.accepts(rec.state) {
            return Err(EngineError::InvalidState {
                id,
                command: Command::Pause.name(),
                state: rec.state,
            });
        }
        if !self.inner.store.apply_transition(id, Transition::PAUSE).await? {
            return Err(self.rejected(id, Command::Pause).await);
        }
        self.inner.control.request_abort(id);
        if let Some(job) = running.remove(&id) {
            if let Err(e) = job.handle.await {
                tracing::warn!(job = id, "pipeline ended abnormally: {e}");
            }
        }
        tracing::info!(job = id, "paused");
        Ok(())
    }

    /// Stop the pipeline, release its resources, then mark the job `Cancelled`.
    /// Downloaded files stay on disk until `remove(id, true)`.
    pub async fn cancel(&self, id: JobId) -> Result<(), EngineError> {
        let mut running = self.running.lock().await;
        let rec = self.require(id).await?;
        if !Command::Cancel.accepts(rec.state) {
            return Err(EngineError::InvalidState {
                id,
                command: Command::Cancel.name(),
                state: rec.state,
            });
        }
        self.inner.control.request_abort(id);
        if let Some(job) = running.remove(&id) {
            if let Err(e) = job.handle.await {
                tracing::warn!(job = id, "pipeline ended abnormally: {e}");
            }
        }
        if !self.inner.store.apply_transition(id, Transition::CANCEL).await? {
            return Err(self.rejected(id, Command::Cancel).await);
        }
        tracing::info!(job = id, "cancelled");
        Ok(())
    }

    /// Forget a terminal job. With `delete_files`, its part file and archive
    /// are deleted too, along with whatever extraction put into the staging
    /// directory. A staging directory without a staging manifest is left alone.
    pub async fn remove(&self, id: JobId, delete_files: bool) -> Result<(), EngineError> {
        let mut running = self.running.lock().await;
        let rec = self.require(id).await?;
        if !Command::Remove.accepts(rec.state) {
            return Err(EngineError::InvalidState {
                id,
                command: Command::Remove.name(),
                state: rec.state,
            });
        }
        if let Some(job) = running.remove(&id) {
            if let Err(e) = job.handle.await {
                tracing::warn!(job = id, "pipeline ended abnormally: {e}");
            }
        }
        if delete_files {
            for path in [rec.part_path(), rec.archive_path()] {
                remove_file(&path).await.map_err(|e| {
                    anyhow::anyhow!("delete {}: {e}", path.display())
                })?;
            }
            let staging = rec.staging_dir();
            let dir = staging.clone();
            let removed = tokio::task::spawn_blocking(move || stager::remove_staged(&dir))
                .await
                .map_err(|e| anyhow::anyhow!("staging cleanup task: {e}"))?
                .map_err(|e| anyhow::anyhow!("delete {}: {e}", staging.display()))?;
            if !removed && staging.exists() {
                tracing::info!(
                    job = id,
                    "keeping {}: not created by extraction",
                    staging.display()
                );
            }
        }
        if !self.inner.store.remove_job(id).await? {
            return Err(self.rejected(id, Command::Remove).await);
        }
        self.inner
            .live
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        tracing::info!(job = id, delete_files, "removed");
        Ok(())
    }

    /// Status view from persisted state plus the last stats tick.
    pub async fn status(&self, id: JobId) -> Result<JobStatus, EngineError> {
        let rec = self.require(id).await?;
        let downloaded = self.inner.store.done_bytes(id).await?;
        let snapshot = self
            .inner
            .live
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .map(|s| s.snapshot())
            .unwrap_or_default();

        let (speed_bps, eta_seconds) = if rec.state == JobState::Downloading {
            (snapshot.speed_bps, snapshot.eta_seconds)
        } else {
            (0.0, None)
        };
        let staging = match snapshot.staging {
            Some(p) => Some(p),
            None if matches!(
                rec.state,
                JobState::Extracting | JobState::Completed | JobState::Failed
            ) =>
            {
                let stored = self.inner.store.staging_result(id).await?;
                let n = stored.entries.len() as u64;
                (n > 0).then_some(StagingProgress {
                    entries_done: n,
                    entries_total: n,
                })
            }
            None => None,
        };

        Ok(JobStatus {
            id,
            state: rec.state,
            progress_percent: crate::planner::progress_percent(downloaded, rec.total_size),
            downloaded_bytes: downloaded,
            total_bytes: rec.total_size,
            speed_bps,
            eta_seconds,
            checksum_state: rec.checksum_state,
            checksum_value: rec.checksum_value,
            failure: rec.failure,
            staging,
        })
    }

    pub async fn list(&self) -> Result<Vec<JobSummary>, EngineError> {
        Ok(self.inner.store.list_jobs().await?)
    }

    pub async fn job(&self, id: JobId) -> Result<JobRecord, EngineError> {
        self.require(id).await
    }

    /// The persisted chunk plan of `id`.
    pub async fn plan(&self, id: JobId) -> Result<ChunkPlan, EngineError> {
        let rec = self.require(id).await?;
        self.inner
            .store
            .load_plan(id, rec.total_size, rec.chunk_size)
            .await?
            .map_err(|source| EngineError::PlanCorruption { id, source })
    }

    /// Wait for the current pipeline of `id` (if any) to stop; returns the
    /// state it left the job in.
    pub async fn wait(&self, id: JobId) -> Result<JobState, EngineError> {
        let done = self
            .running
            .lock()
            .await
            .get(&id)
            .map(|job| job.done.clone());
        if let Some(mut rx) = done {
            // Err means the pipeline task is gone, which is just as final.
            let _ = rx.wait_for(|finished| *finished).await;
        }
        self.current_state(id).await
    }

    /// Paths the job writes to: part file, archive, extraction directory.
    pub async fn paths(&self, id: JobId) -> Result<[PathBuf; 3], EngineError> {
        let rec = self.require(id).await?;
        Ok([rec.part_path(), rec.archive_path(), rec.staging_dir()])
    }
}
