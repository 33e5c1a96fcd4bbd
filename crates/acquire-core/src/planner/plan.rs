//! In-memory chunk plan: ranges plus per-range transfer state.

use super::range::{plan_chunks, Chunk};

/// Transfer state of one range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    InFlight,
    Done,
    Failed,
}

impl ChunkState {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkState::Pending => "pending",
            ChunkState::InFlight => "in_flight",
            ChunkState::Done => "done",
            ChunkState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ChunkState::Pending),
            "in_flight" => Some(ChunkState::InFlight),
            "done" => Some(ChunkState::Done),
            "failed" => Some(ChunkState::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlanError {
    /// A persisted plan does not partition [0, total) or has unreadable rows.
    #[error("chunk plan corrupted: {0}")]
    Corruption(String),
    #[error("no chunk with index {0}")]
    UnknownChunk(usize),
    /// Done is final; a finished range never goes back to be fetched again.
    #[error("chunk {0} is already done")]
    AlreadyDone(usize),
}

/// Ordered ranges covering [0, total_size) with their transfer state.
///
/// Invariant: ranges are contiguous, non-overlapping and their union is
/// exactly [0, total_size). `new` guarantees it; `from_rows` checks it.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
    chunks: Vec<Chunk>,
    states: Vec<ChunkState>,
    failures: Vec<u32>,
}

impl ChunkPlan {
    /// Fresh plan with every range Pending.
    pub fn new(total_size: u64, chunk_size: u64) -> Self {
        let chunks = plan_chunks(total_size, chunk_size);
        let n = chunks.len();
        Self {
            total_size,
            chunk_size,
            chunks,
            states: vec![ChunkState::Pending; n],
            failures: vec![0; n],
        }
    }

    /// Rebuild a plan from persisted rows (ordered by index).
    ///
    /// Rows left InFlight by an interrupted run come back as Pending. Any
    /// violation of the partition invariant is reported, not repaired.
    pub fn from_rows(
        total_size: u64,
        chunk_size: u64,
        rows: Vec<(Chunk, ChunkState, u32)>,
    ) -> Result<Self, PlanError> {
        if chunk_size == 0 && total_size > 0 {
            return Err(PlanError::Corruption("chunk size is zero".into()));
        }
        let mut expected_start = 0u64;
        let mut chunks = Vec::with_capacity(rows.len());
        let mut states = Vec::with_capacity(rows.len());
        let mut failures = Vec::with_capacity(rows.len());
        for (i, (chunk, state, fails)) in rows.into_iter().enumerate() {
            if chunk.start != expected_start {
                return Err(PlanError::Corruption(format!(
                    "chunk {i} starts at {} but previous range ended at {expected_start}",
                    chunk.start
                )));
            }
            if chunk.is_empty() || chunk.len() > chunk_size {
                return Err(PlanError::Corruption(format!(
                    "chunk {i} has invalid length {}",
                    chunk.len()
                )));
            }
            expected_start = chunk.end;
            chunks.push(chunk);
            states.push(match state {
                ChunkState::InFlight => ChunkState::Pending,
                s => s,
            });
            failures.push(fails);
        }
        if expected_start != total_size {
            return Err(PlanError::Corruption(format!(
                "ranges cover [0, {expected_start}) but total size is {total_size}"
            )));
        }
        Ok(Self {
            total_size,
            chunk_size,
            chunks,
            states,
            failures,
        })
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, index: usize) -> Result<Chunk, PlanError> {
        self.chunks
            .get(index)
            .copied()
            .ok_or(PlanError::UnknownChunk(index))
    }

    pub fn state(&self, index: usize) -> Option<ChunkState> {
        self.states.get(index).copied()
    }

    pub fn failures(&self, index: usize) -> u32 {
        self.failures.get(index).copied().unwrap_or(0)
    }

    /// Next range a worker may fetch: the first Pending one, otherwise the first
    /// Failed one still under `max_failures`.
    pub fn next_claimable(&self, max_failures: u32) -> Option<usize> {
        self.states
            .iter()
            .position(|s| *s == ChunkState::Pending)
            .or_else(|| {
                self.states
                    .iter()
                    .enumerate()
                    .find(|(i, s)| **s == ChunkState::Failed && self.failures[*i] < max_failures)
                    .map(|(i, _)| i)
            })
    }

    fn set(&mut self, index: usize, to: ChunkState) -> Result<(), PlanError> {
        let state = self
            .states
            .get_mut(index)
            .ok_or(PlanError::UnknownChunk(index))?;
        if *state == ChunkState::Done && to != ChunkState::Done {
            return Err(PlanError::AlreadyDone(index));
        }
        *state = to;
        Ok(())
    }

    pub fn mark_in_flight(&mut self, index: usize) -> Result<(), PlanError> {
        self.set(index, ChunkState::InFlight)
    }

    pub fn mark_done(&mut self, index: usize) -> Result<(), PlanError> {
        self.set(index, ChunkState::Done)
    }

    /// Mark a range Failed and return its updated failure count.
    pub fn mark_failed(&mut self, index: usize) -> Result<u32, PlanError> {
        self.set(index, ChunkState::Failed)?;
        self.failures[index] = self.failures[index].saturating_add(1);
        Ok(self.failures[index])
    }

    /// Put an interrupted range back to Pending without counting a failure.
    pub fn revert(&mut self, index: usize) -> Result<(), PlanError> {
        self.set(index, ChunkState::Pending)
    }

    pub fn indices_in(&self, state: ChunkState) -> Vec<usize> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == state)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn count(&self, state: ChunkState) -> usize {
        self.states.iter().filter(|s| **s == state).count()
    }

    /// Sum of Done range sizes.
    pub fn done_bytes(&self) -> u64 {
        self.chunks
            .iter()
            .zip(&self.states)
            .filter(|(_, s)| **s == ChunkState::Done)
            .map(|(c, _)| c.len())
            .sum()
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.total_size - self.done_bytes()
    }

    pub fn is_complete(&self) -> bool {
        self.states.iter().all(|s| *s == ChunkState::Done)
    }

    /// Done bytes over total size, as a percentage in [0, 100].
    pub fn progress_percent(&self) -> f64 {
        progress_percent(self.done_bytes(), self.total_size)
    }
}

/// Shared percentage helper; an empty resource counts as complete.
pub(crate) fn progress_percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (done as f64 / total as f64 * 100.0).min(100.0)
}
