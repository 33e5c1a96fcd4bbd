use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per range fetch (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
    /// Randomize each backoff delay so retrying workers do not stampede.
    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
            jitter: self.jitter,
        }
    }
}

/// Transport tuning for the bundled HTTP source (optional section in config.toml).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    /// Abort a transfer whose throughput stays below this many bytes/sec ...
    pub low_speed_limit_bytes: u32,
    /// ... for this many seconds.
    pub low_speed_time_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_limit_bytes: 1024,
            low_speed_time_secs: 60,
        }
    }
}

/// Global configuration loaded from `~/.config/acquire/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireConfig {
    /// Size of one planned range. Fixed per job when it is submitted.
    pub chunk_size_bytes: u64,
    /// Concurrent range fetches per active job.
    pub workers: usize,
    /// Exhausted-retry failures a single range may accumulate before the job fails.
    pub max_chunk_failures: u32,
    /// Interval at which transfer speed is sampled, in milliseconds.
    pub progress_tick_ms: u64,
    /// Weight of the newest speed sample in the moving average (0, 1].
    pub speed_smoothing: f64,
    /// Streaming buffer size for digest computation and archive copies.
    pub verify_buffer_bytes: usize,
    /// Extra attempts for an archive entry that failed to extract.
    pub staging_entry_retries: u32,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub http: Option<HttpConfig>,
}

pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;
const MAX_WORKERS: usize = 64;

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            workers: 8,
            max_chunk_failures: 3,
            progress_tick_ms: 500,
            speed_smoothing: 0.3,
            verify_buffer_bytes: 64 * 1024,
            staging_entry_retries: 1,
            retry: None,
            http: None,
        }
    }
}

impl AcquireConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_bytes == 0 {
            anyhow::bail!("chunk_size_bytes must be greater than zero");
        }
        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        if !(self.speed_smoothing > 0.0 && self.speed_smoothing <= 1.0) {
            anyhow::bail!("speed_smoothing must be in (0, 1]");
        }
        if self.verify_buffer_bytes == 0 {
            anyhow::bail!("verify_buffer_bytes must be greater than zero");
        }
        Ok(())
    }

    /// Worker count clamped to a sane upper bound.
    pub fn effective_workers(&self) -> usize {
        self.workers.clamp(1, MAX_WORKERS)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(RetryConfig::to_policy)
            .unwrap_or_default()
    }

    pub fn http_config(&self) -> HttpConfig {
        self.http.unwrap_or_default()
    }

    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms.max(10))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("acquire")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<AcquireConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = AcquireConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: AcquireConfig = toml::from_str(&data)?;
    cfg.validate()?;
    Ok(cfg)
}
