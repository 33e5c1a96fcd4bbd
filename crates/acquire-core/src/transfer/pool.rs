//! Bounded worker pool that drives one job's chunk plan to completion.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use super::{LiveStats, PlanTracker, TransferError};
use crate::fetcher::{FetchError, RangeFetcher};
use crate::job::JobId;
use crate::retry::SourceError;
use crate::storage::PartFile;

/// Everything the pool needs for one run.
pub struct TransferContext {
    pub job_id: JobId,
    pub handle: String,
    pub total_size: u64,
    pub fetcher: RangeFetcher,
    pub file: PartFile,
    pub tracker: Arc<PlanTracker>,
    pub workers: usize,
    /// Set by pause/cancel.
    pub abort: Arc<AtomicBool>,
    pub stats: Arc<LiveStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Every range is Done and the part file is synced.
    Completed,
    /// Stopped by the abort token; unfinished ranges are Pending again.
    Aborted,
}

/// Run workers until the plan is complete, the abort token fires, or a
/// fatal error stops the job. Blocks; call from `spawn_blocking`.
pub fn run_transfer(ctx: TransferContext) -> Result<TransferOutcome, TransferError> {
    if ctx.tracker.is_complete() {
        return Ok(TransferOutcome::Completed);
    }

    let claimable = ctx.tracker.claimable_count();
    let num_workers = ctx.workers.clamp(1, claimable.max(1));
    let halt = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel::<TransferError>();

    tracing::debug!(job = ctx.job_id, num_workers, claimable, "starting transfer workers");

    let ctx = Arc::new(ctx);
    let mut handles = Vec::with_capacity(num_workers);
    for worker in 0..num_workers {
        let ctx = Arc::clone(&ctx);
        let halt = Arc::clone(&halt);
        let tx = tx.clone();
        handles.push(std::thread::spawn(move || {
            if let Err(e) = worker_loop(&ctx, &halt) {
                tracing::warn!(job = ctx.job_id, worker, "worker stopped: {e}");
                halt.store(true, Ordering::SeqCst);
                let _ = tx.send(e);
            }
        }));
    }
    drop(tx);

    let mut panicked = false;
    for h in handles {
        panicked |= h.join().is_err();
    }
    if let Some(first) = rx.try_iter().next() {
        return Err(first);
    }
    if panicked {
        return Err(TransferError::WorkerPanicked);
    }
    if ctx.abort.load(Ordering::SeqCst) {
        return Ok(TransferOutcome::Aborted);
    }
    if !ctx.tracker.is_complete() {
        return Err(TransferError::Incomplete {
            remaining: ctx.total_size.saturating_sub(ctx.tracker.done_bytes()),
        });
    }
    ctx.file.sync().map_err(|source| TransferError::Storage { index: None, source })?;
    Ok(TransferOutcome::Completed)
}

fn worker_loop(ctx: &TransferContext, halt: &AtomicBool) -> Result<(), TransferError> {
    let stop = || ctx.abort.load(Ordering::SeqCst) || halt.load(Ordering::SeqCst);

    while !stop() {
        let Some((idx, chunk)) = ctx.tracker.claim()? else {
            break;
        };

        let mut sink = |pos: u64, data: &[u8]| -> io::Result<()> {
            ctx.file.write_at(chunk.start + pos, data)?;
            ctx.stats.add_bytes(data.len() as u64);
            Ok(())
        };
        let res = ctx.fetcher.fetch(
            &ctx.handle,
            chunk.start,
            chunk.len(),
            ctx.total_size,
            &stop,
            &mut sink,
        );

        match res {
            Ok(_) => {
                if ctx.tracker.complete(idx, &stop, &|| ctx.file.sync())? {
                    ctx.stats.set_done_bytes(ctx.tracker.done_bytes());
                }
            }
            Err(FetchError::Aborted) => ctx.tracker.release(idx)?,
            Err(e @ FetchError::Transient { .. }) => {
                let failures = ctx.tracker.fail(idx)?;
                tracing::warn!(
                    job = ctx.job_id,
                    chunk = idx,
                    failures,
                    "range failed after retries: {e}"
                );
                if failures >= ctx.tracker.max_failures() {
                    return Err(TransferError::Exhausted {
                        index: idx,
                        failures,
                        source: e,
                    });
                }
            }
            Err(FetchError::Permanent(SourceError::Sink(source))) => {
                ctx.tracker.release(idx)?;
                return Err(TransferError::Storage {
                    index: Some(idx),
                    source,
                });
            }
            Err(e) => {
                ctx.tracker.release(idx)?;
                return Err(TransferError::Permanent { index: idx, source: e });
            }
        }
    }
    Ok(())
}
