//! Single-writer access to a job's chunk plan.
//!
//! Workers claim, complete and fail ranges through the tracker. Every change
//! happens under one mutex and is written to the store before the call
//! returns, so the persisted plan is never behind what a worker acted on.

use std::io;
use std::sync::{Mutex, MutexGuard};

use tokio::runtime::Handle;

use super::TransferError;
use crate::job::JobId;
use crate::planner::{Chunk, ChunkPlan, ChunkState};
use crate::store::JobStore;

pub struct PlanTracker {
    job_id: JobId,
    plan: Mutex<ChunkPlan>,
    store: JobStore,
    rt: Handle,
    max_failures: u32,
}

impl PlanTracker {
    /// `rt` drives the store's futures; the tracker must be used from plain
    /// threads, not from inside an async task.
    pub fn new(job_id: JobId, plan: ChunkPlan, store: JobStore, rt: Handle, max_failures: u32) -> Self {
        Self {
            job_id,
            plan: Mutex::new(plan),
            store,
            rt,
            max_failures: max_failures.max(1),
        }
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    fn lock(&self) -> Result<MutexGuard<'_, ChunkPlan>, TransferError> {
        self.plan.lock().map_err(|_| TransferError::WorkerPanicked)
    }

    fn persist(&self, plan: &ChunkPlan, idx: usize) -> Result<(), TransferError> {
        let state = plan.state(idx).unwrap_or(ChunkState::Pending);
        self.rt
            .block_on(self.store.set_chunk_state(self.job_id, idx, state, plan.failures(idx)))
            .map_err(TransferError::Persist)
    }

    /// Take the next Pending range (or a Failed one under the ceiling) and
    /// mark it InFlight.
    pub fn claim(&self) -> Result<Option<(usize, Chunk)>, TransferError> {
        let mut plan = self.lock()?;
        let Some(idx) = plan.next_claimable(self.max_failures) else {
            return Ok(None);
        };
        let chunk = plan.chunk(idx)?;
        plan.mark_in_flight(idx)?;
        self.persist(&plan, idx)?;
        Ok(Some((idx, chunk)))
    }

    /// Mark `idx` Done unless `stop` fired, in which case it goes back to
    /// Pending. Returns whether it was marked Done.
    ///
    /// `flush` must make the range's bytes durable. It runs before the Done
    /// mark is written and outside the plan lock; if it fails the range goes
    /// back to Pending and the error is returned.
    pub fn complete(
        &self,
        idx: usize,
        stop: &dyn Fn() -> bool,
        flush: &dyn Fn() -> io::Result<()>,
    ) -> Result<bool, TransferError> {
        let flushed = if stop() { Ok(false) } else { flush().map(|()| true) };
        let mut plan = self.lock()?;
        match flushed {
            Ok(true) => {
                plan.mark_done(idx)?;
                self.persist(&plan, idx)?;
                Ok(true)
            }
            Ok(false) => {
                plan.revert(idx)?;
                self.persist(&plan, idx)?;
                Ok(false)
            }
            Err(source) => {
                plan.revert(idx)?;
                self.persist(&plan, idx)?;
                Err(TransferError::Storage {
                    index: Some(idx),
                    source,
                })
            }
        }
    }

    /// Mark `idx` Failed; returns its failure count.
    pub fn fail(&self, idx: usize) -> Result<u32, TransferError> {
        let mut plan = self.lock()?;
        let n = plan.mark_failed(idx)?;
        self.persist(&plan, idx)?;
        Ok(n)
    }

    /// Return an interrupted range to Pending without counting a failure.
    pub fn release(&self, idx: usize) -> Result<(), TransferError> {
        let mut plan = self.lock()?;
        plan.revert(idx)?;
        self.persist(&plan, idx)
    }

    pub fn done_bytes(&self) -> u64 {
        self.plan.lock().map(|p| p.done_bytes()).unwrap_or(0)
    }

    pub fn is_complete(&self) -> bool {
        self.plan.lock().map(|p| p.is_complete()).unwrap_or(false)
    }

    pub fn claimable_count(&self) -> usize {
        self.plan
            .lock()
            .map(|p| p.count(ChunkState::Pending) + p.count(ChunkState::Failed))
            .unwrap_or(0)
    }
}
