//! `acquire pause <id>` / `acquire cancel <id>`. A foreground process that
//! runs the job is asked over the control socket; otherwise the job is
//! handled here.

use acquire_core::control::ControlRequest;
use anyhow::Result;

use super::session;
use crate::cli::control_socket;

pub async fn run_pause(id: i64) -> Result<()> {
    deliver(ControlRequest::Pause(id)).await?;
    println!("Paused job {id}");
    Ok(())
}

pub async fn run_cancel(id: i64) -> Result<()> {
    deliver(ControlRequest::Cancel(id)).await?;
    println!("Cancelled job {id}");
    Ok(())
}

async fn deliver(req: ControlRequest) -> Result<()> {
    let path = acquire_core::control::default_control_socket_path()?;
    if let Some(reply) = control_socket::send_request(&path, req).await? {
        return match reply.strip_prefix("error: ") {
            Some(msg) => Err(anyhow::anyhow!("{msg}")),
            None => Ok(()),
        };
    }
    let engine = session().await?.engine;
    match req {
        ControlRequest::Pause(id) => engine.pause(id).await?,
        ControlRequest::Cancel(id) => engine.cancel(id).await?,
    }
    Ok(())
}
