//! Transfer statistics: smoothed speed and ETA, sampled on a fixed tick.
//!
//! Workers only bump an atomic byte counter. A ticker task turns the counter
//! into an exponentially weighted speed every `progress_tick`, so readings do
//! not jump with each chunk completion. Status reads take the last snapshot
//! and never wait on a worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::job::StagingProgress;

/// EWMA over bytes/sec samples.
#[derive(Debug, Clone)]
pub struct SpeedMeter {
    alpha: f64,
    smoothed: f64,
    last: Option<(u64, Instant)>,
    primed: bool,
}

impl SpeedMeter {
    /// `alpha` is the weight of the newest sample, in (0, 1].
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::MIN_POSITIVE, 1.0),
            smoothed: 0.0,
            last: None,
            primed: false,
        }
    }

    /// Feed the running byte total observed at `now`; returns the smoothed speed.
    /// The first call only sets the baseline.
    pub fn sample(&mut self, total_bytes: u64, now: Instant) -> f64 {
        let Some((prev_bytes, prev_at)) = self.last.replace((total_bytes, now)) else {
            return self.smoothed;
        };
        let dt = now.saturating_duration_since(prev_at).as_secs_f64();
        if dt <= 0.0 {
            return self.smoothed;
        }
        let instant = total_bytes.saturating_sub(prev_bytes) as f64 / dt;
        self.smoothed = if self.primed {
            self.alpha * instant + (1.0 - self.alpha) * self.smoothed
        } else {
            instant
        };
        self.primed = true;
        self.smoothed
    }

    pub fn speed(&self) -> f64 {
        self.smoothed
    }
}

/// Seconds left at `speed_bps`; `None` while nothing is moving.
pub fn eta_seconds(remaining_bytes: u64, speed_bps: f64) -> Option<u64> {
    if speed_bps <= 0.0 || !speed_bps.is_finite() {
        return None;
    }
    Some((remaining_bytes as f64 / speed_bps).ceil() as u64)
}

/// Last published view of a running job.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransferStats {
    pub speed_bps: f64,
    pub eta_seconds: Option<u64>,
    pub staging: Option<StagingProgress>,
}

/// Shared between workers, the ticker and status readers.
#[derive(Debug, Default)]
pub struct LiveStats {
    session_bytes: AtomicU64,
    done_bytes: AtomicU64,
    snapshot: RwLock<TransferStats>,
}

impl LiveStats {
    pub fn new(done_bytes: u64) -> Self {
        let stats = Self::default();
        stats.done_bytes.store(done_bytes, Ordering::Relaxed);
        stats
    }

    /// Bytes received from the source in this session (retries included).
    pub fn add_bytes(&self, n: u64) {
        self.session_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn session_bytes(&self) -> u64 {
        self.session_bytes.load(Ordering::Relaxed)
    }

    pub fn set_done_bytes(&self, n: u64) {
        self.done_bytes.store(n, Ordering::Relaxed);
    }

    pub fn done_bytes(&self) -> u64 {
        self.done_bytes.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TransferStats {
        self.snapshot.read().map(|s| *s).unwrap_or_default()
    }

    fn update(&self, f: impl FnOnce(&mut TransferStats)) {
        if let Ok(mut s) = self.snapshot.write() {
            f(&mut s);
        }
    }

    pub fn publish_speed(&self, speed_bps: f64, eta_seconds: Option<u64>) {
        self.update(|s| {
            s.speed_bps = speed_bps;
            s.eta_seconds = eta_seconds;
        });
    }

    /// Nothing is transferring any more.
    pub fn settle(&self) {
        self.publish_speed(0.0, None);
    }

    pub fn set_staging(&self, progress: StagingProgress) {
        self.update(|s| s.staging = Some(progress));
    }
}

/// Sample `stats` every `tick` until the returned handle is aborted.
pub fn spawn_ticker(
    stats: Arc<LiveStats>,
    total_size: u64,
    tick: Duration,
    smoothing: f64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut meter = SpeedMeter::new(smoothing);
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let now = tokio::time::Instant::now().into_std();
            let speed = meter.sample(stats.session_bytes(), now);
            let remaining = total_size.saturating_sub(stats.done_bytes());
            stats.publish_speed(speed, eta_seconds(remaining, speed));
        }
    })
}
