//! Durable job state (SQLite via sqlx).
//!
//! One row per job, one row per planned range, and the per-entry outcome of
//! the last extraction. Chunk rows are rewritten on every range transition so
//! a restarted process knows exactly which ranges still need fetching.

mod chunks;
mod db;
mod jobs;
mod staging;

pub use db::JobStore;
pub use jobs::NewJob;

#[cfg(test)]
pub(crate) use db::open_memory;

#[cfg(test)]
mod tests;
