//! Range fetching.
//!
//! `RangeSource` is the seam to whatever holds the bytes (an HTTP server via
//! `CurlSource`, or an in-process source in tests). `RangeFetcher` wraps a
//! source with bounds checks and the shared retry policy, and turns raw
//! source errors into the Transient / Permanent split the coordinator acts on.

mod head;
mod http;

pub use head::{parse_headers, HeadInfo};
pub use http::CurlSource;

use std::io;
use std::sync::Arc;

use crate::retry::{run_with_retry, ErrorKind, RetryPolicy, SourceError};

/// What a source reports about a resource before any byte is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    /// Declared total size in bytes.
    pub total_size: u64,
    /// Filename hint (e.g. from Content-Disposition).
    pub filename: Option<String>,
    /// SHA-256 the source publishes for the content, if any (lowercase hex).
    pub digest: Option<String>,
}

/// A remote resource that can be read by byte range.
///
/// Implementations perform exactly one attempt per call; retries are the
/// fetcher's job. `read_range` must hand every received byte to `on_data` in
/// order and report `SourceError::PartialTransfer` if the window was cut short.
pub trait RangeSource: Send + Sync {
    fn resolve(&self, handle: &str) -> Result<ResourceInfo, SourceError>;

    fn read_range(
        &self,
        handle: &str,
        offset: u64,
        length: u64,
        on_data: &mut dyn FnMut(&[u8]) -> io::Result<()>,
    ) -> Result<(), SourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Retryable failure that persisted through every allowed attempt.
    #[error("transient failure after {attempts} attempt(s): {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: SourceError,
    },
    /// Definitive rejection (not found, forbidden, local write failure).
    #[error("permanent failure: {0}")]
    Permanent(#[source] SourceError),
    /// Stopped by pause/cancel.
    #[error("fetch aborted")]
    Aborted,
    #[error("range {offset}+{length} exceeds resource size {total}")]
    OutOfBounds { offset: u64, length: u64, total: u64 },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// Error raised inside `on_data` to stop a transfer on pause/cancel.
fn aborted_io() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "fetch aborted")
}

/// Bounds-checked, retrying front end over a `RangeSource`.
#[derive(Clone)]
pub struct RangeFetcher {
    source: Arc<dyn RangeSource>,
    policy: RetryPolicy,
}

impl RangeFetcher {
    pub fn new(source: Arc<dyn RangeSource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Resolve the declared size (and hints) of `handle`, retrying transient failures.
    pub fn resolve(&self, handle: &str) -> Result<ResourceInfo, FetchError> {
        run_with_retry(&self.policy, || false, |_| self.source.resolve(handle))
            .map_err(|g| into_fetch_error(g.kind, g.attempts, g.last))
    }

    /// Fetch `[offset, offset + length)` of `handle`, streaming the bytes to
    /// `sink(position_in_window, data)`.
    ///
    /// A retry starts the window over from position 0, so the sink sees each
    /// position again; writes must therefore be idempotent per position (the
    /// coordinator writes to fixed file offsets). `cancelled` is polled before
    /// each attempt, on every received block, and during backoff.
    pub fn fetch(
        &self,
        handle: &str,
        offset: u64,
        length: u64,
        total: u64,
        cancelled: &dyn Fn() -> bool,
        sink: &mut dyn FnMut(u64, &[u8]) -> io::Result<()>,
    ) -> Result<u64, FetchError> {
        if offset.checked_add(length).map_or(true, |end| end > total) {
            return Err(FetchError::OutOfBounds {
                offset,
                length,
                total,
            });
        }
        if cancelled() {
            return Err(FetchError::Aborted);
        }

        let result = run_with_retry(&self.policy, cancelled, |attempt| {
            if cancelled() {
                return Err(SourceError::Aborted);
            }
            let mut pos = 0u64;
            let mut on_data = |data: &[u8]| -> io::Result<()> {
                if cancelled() {
                    return Err(aborted_io());
                }
                sink(pos, data)?;
                pos += data.len() as u64;
                Ok(())
            };
            let r = self.source.read_range(handle, offset, length, &mut on_data);
            if attempt > 1 && r.is_ok() {
                tracing::debug!(offset, length, attempt, "range fetched after retry");
            }
            match r {
                Ok(()) if pos != length => Err(SourceError::PartialTransfer {
                    expected: length,
                    received: pos,
                }),
                other => other,
            }
        });

        match result {
            Ok(()) => Ok(length),
            Err(_) if cancelled() => Err(FetchError::Aborted),
            Err(g) => Err(into_fetch_error(g.kind, g.attempts, g.last)),
        }
    }
}

fn into_fetch_error(kind: ErrorKind, attempts: u32, last: SourceError) -> FetchError {
    match last {
        SourceError::Aborted => FetchError::Aborted,
        last if kind.is_transient() => FetchError::Transient {
            attempts,
            source: last,
        },
        last => FetchError::Permanent(last),
    }
}
