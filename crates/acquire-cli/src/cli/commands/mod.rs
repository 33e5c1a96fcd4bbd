//! CLI command handlers, one file per command group.

mod checksum;
mod completions;
mod control;
mod extract;
mod remove;
mod start;
mod status;
mod submit;

pub use checksum::run_checksum;
pub use completions::run_completions;
pub use control::{run_cancel, run_pause};
pub use extract::run_extract;
pub use remove::run_remove;
pub use start::{run_resume, run_start};
pub use status::{run_list, run_status};
pub use submit::{run_submit, SubmitArgs};

use acquire_core::config;
use acquire_core::control::default_control_socket_path;
use acquire_core::fetcher::{CurlSource, RangeSource};
use acquire_core::store::JobStore;
use acquire_core::Engine;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use super::control_socket;

/// An engine plus what this process knows about other running instances.
pub(super) struct Session {
    pub engine: Engine,
    pub socket: PathBuf,
    /// Another foreground process is serving the control socket; its jobs
    /// are still running and must not be crash-recovered.
    pub other_live: bool,
}

pub(super) async fn session() -> Result<Session> {
    let cfg = config::load_or_init()?;
    tracing::debug!("loaded config: {:?}", cfg);
    let socket = default_control_socket_path()?;
    let other_live = control_socket::is_live(&socket).await;
    let store = JobStore::open_default().await?;
    let source: Arc<dyn RangeSource> = Arc::new(CurlSource::new(cfg.http_config()));
    let engine = if other_live {
        Engine::attach(store, source, cfg)?
    } else {
        Engine::open(store, source, cfg).await?
    };
    Ok(Session {
        engine,
        socket,
        other_live,
    })
}
