//! Chunk planning.
//!
//! Partitions a known total size into fixed-size byte ranges, tracks the
//! transfer state of each range, and checks the partition invariant when a
//! persisted plan is loaded back. Persistence itself lives in `store`.

mod plan;
mod range;

pub use plan::{ChunkPlan, ChunkState, PlanError};
pub(crate) use plan::progress_percent;
pub use range::{plan_chunks, Chunk};
