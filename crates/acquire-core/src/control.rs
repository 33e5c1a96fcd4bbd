//! Pause/cancel plumbing: per-job abort tokens and the control-socket protocol.
//!
//! The engine registers a token for every pipeline it starts. Workers, the
//! verifier and the stager poll it; `pause` and `cancel` set it. A foreground
//! CLI run also listens on a Unix socket so another shell can send
//! `pause <id>` or `cancel <id>` lines.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::job::JobId;

pub type AbortToken = Arc<AtomicBool>;

/// Registry of job id -> abort token of its current pipeline.
#[derive(Default, Debug)]
pub struct JobControl {
    jobs: RwLock<HashMap<JobId, AbortToken>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh token for a new pipeline of `job_id`, replacing any older one.
    pub fn register(&self, job_id: JobId) -> AbortToken {
        let token = AbortToken::default();
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id, Arc::clone(&token));
        token
    }

    /// Drop `token` if it is still the registered one. A pipeline that ends
    /// after a newer one started must not remove the newer token.
    pub fn unregister(&self, job_id: JobId, token: &AbortToken) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs.get(&job_id).is_some_and(|t| Arc::ptr_eq(t, token)) {
            jobs.remove(&job_id);
        }
    }

    /// Signal the running pipeline of `job_id`. Returns false if none is registered.
    pub fn request_abort(&self, job_id: JobId) -> bool {
        match self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job_id)
        {
            Some(token) => {
                token.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, job_id: JobId) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&job_id)
    }
}

/// One line on the control socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Pause(JobId),
    Cancel(JobId),
}

impl ControlRequest {
    /// Parses `pause <id>` / `cancel <id>`; anything else is `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let verb = parts.next()?;
        let id: JobId = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        match verb {
            "pause" => Some(ControlRequest::Pause(id)),
            "cancel" => Some(ControlRequest::Cancel(id)),
            _ => None,
        }
    }

    pub fn job_id(self) -> JobId {
        match self {
            ControlRequest::Pause(id) | ControlRequest::Cancel(id) => id,
        }
    }
}

impl fmt::Display for ControlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlRequest::Pause(id) => write!(f, "pause {id}"),
            ControlRequest::Cancel(id) => write!(f, "cancel {id}"),
        }
    }
}

/// `~/.local/state/acquire/control.sock`.
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("acquire")?.get_state_home();
    Ok(dir.join("control.sock"))
}
