//! Retry loop: run a closure until success, a definitive failure, or the policy says stop.

use std::time::{Duration, Instant};

use super::classify;
use super::error::SourceError;
use super::policy::{ErrorKind, RetryDecision, RetryPolicy};

/// Granularity at which a backoff sleep re-checks the cancel signal.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Last error of a retry loop that stopped without success.
#[derive(Debug)]
pub struct GaveUp {
    /// Attempts made, including the first.
    pub attempts: u32,
    pub kind: ErrorKind,
    pub last: SourceError,
}

/// Runs `f` until it succeeds or the retry policy says to stop.
/// On retryable failure, sleeps for the (jittered) backoff then tries again.
/// `cancelled` is polled between attempts and during the backoff sleep; once it
/// returns true the loop stops with the last error.
pub fn run_with_retry<T, F, C>(policy: &RetryPolicy, cancelled: C, mut f: F) -> Result<T, GaveUp>
where
    F: FnMut(u32) -> Result<T, SourceError>,
    C: Fn() -> bool,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                let give_up = |last| GaveUp {
                    attempts: attempt,
                    kind,
                    last,
                };
                if cancelled() {
                    return Err(give_up(e));
                }
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(give_up(e)),
                    RetryDecision::RetryAfter(d) => {
                        let d = policy.jittered(d);
                        tracing::debug!(attempt, ?kind, delay_ms = d.as_millis() as u64, "retrying: {}", e);
                        if !sleep_unless_cancelled(d, &cancelled) {
                            return Err(give_up(e));
                        }
                        attempt += 1;
                    }
                }
            }
        }
    }
}

/// Sleep for `d`, waking early when `cancelled` turns true. Returns false if cancelled.
fn sleep_unless_cancelled<C: Fn() -> bool>(d: Duration, cancelled: &C) -> bool {
    let deadline = Instant::now() + d;
    loop {
        if cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(CANCEL_POLL));
    }
}
