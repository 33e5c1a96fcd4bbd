//! Raw error reported by a range source, before retry classification.

use std::io;

use super::policy::ErrorKind;

/// Error returned by a single attempt against a range source (curl failure,
/// HTTP error, short body, or a sink that refused the bytes).
/// Kept separate from `FetchError` so it can be classified before the retry
/// loop decides whether to try again.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Curl reported an error (timeout, connection, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// HTTP response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Server answered a ranged request with a full (or mismatched) body.
    #[error("server ignored the range request (HTTP {0})")]
    RangeIgnored(u32),
    /// Transfer ended before the requested window was delivered.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// The consumer of the bytes failed (e.g. disk full). Not retried.
    #[error("sink: {0}")]
    Sink(#[source] io::Error),
    /// Network-level failure from a non-curl source, already classified.
    #[error("{message}")]
    Network { kind: ErrorKind, message: String },
    /// The resource handle does not resolve to anything.
    #[error("resource not found: {0}")]
    NotFound(String),
    /// The request was interrupted by a pause or cancel.
    #[error("aborted")]
    Aborted,
}
