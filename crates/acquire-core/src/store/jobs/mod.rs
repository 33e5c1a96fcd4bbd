//! Job rows: read and write halves.

mod read;
mod write;

use std::path::PathBuf;

/// Everything known about a job at submission time.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub source: String,
    pub destination: PathBuf,
    pub filename: String,
    pub total_size: u64,
    pub chunk_size: u64,
    pub expected_digest: Option<String>,
}

/// `state IN (?2, ?3, ...)` for a compare-and-set guard starting at `first`.
fn state_guard(first: usize, count: usize) -> String {
    let params: Vec<String> = (first..first + count).map(|i| format!("?{i}")).collect();
    format!("state IN ({})", params.join(", "))
}
