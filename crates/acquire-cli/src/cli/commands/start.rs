//! `acquire start` / `acquire resume`: run jobs in this process and print
//! progress until none of them is active.

use acquire_core::job::{Command, JobId};
use acquire_core::{Engine, JobState};
use anyhow::Result;

use super::{session, Session};
use crate::cli::control_socket::ControlListener;
use crate::cli::format;

pub async fn run_start(ids: &[JobId]) -> Result<()> {
    foreground(session().await?, ids, Command::Start).await
}

pub async fn run_resume(ids: &[JobId]) -> Result<()> {
    foreground(session().await?, ids, Command::Resume).await
}

pub(super) async fn foreground(session: Session, ids: &[JobId], cmd: Command) -> Result<()> {
    let engine = session.engine;
    let _listener = if session.other_live {
        eprintln!(
            "another acquire process serves {}; pause/cancel from other shells will not reach these jobs",
            session.socket.display()
        );
        None
    } else {
        match ControlListener::bind(engine.clone(), &session.socket) {
            Ok(l) => Some(l),
            Err(e) => {
                tracing::warn!("control socket unavailable: {e:#}");
                None
            }
        }
    };

    for &id in ids {
        match cmd {
            Command::Resume => engine.resume(id).await?,
            _ => engine.start(id).await?,
        }
    }
    follow(&engine, ids).await
}

async fn follow(engine: &Engine, ids: &[JobId]) -> Result<()> {
    let mut tick = tokio::time::interval(engine.config().progress_tick());
    let mut interrupt = std::pin::pin!(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut interrupt => {
                println!();
                return interrupted(engine, ids).await;
            }
        }
        let mut active = 0;
        for &id in ids {
            let st = engine.status(id).await?;
            if st.state.is_active() {
                active += 1;
                println!("{}", format::progress_line(&st));
            }
        }
        if active == 0 {
            break;
        }
    }

    let mut failed = 0;
    for &id in ids {
        let st = engine.status(id).await?;
        match st.state {
            JobState::Completed => println!("Job {id} completed"),
            JobState::Failed => {
                failed += 1;
                match &st.failure {
                    Some((cause, detail)) => println!("Job {id} failed ({cause}): {detail}"),
                    None => println!("Job {id} failed"),
                }
            }
            other => println!("Job {id} {other}"),
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} job(s) failed");
    }
    Ok(())
}

/// Ctrl-C: pause what can be paused. Jobs caught verifying or extracting
/// come back as Paused on the next start of the engine.
async fn interrupted(engine: &Engine, ids: &[JobId]) -> Result<()> {
    for &id in ids {
        match engine.pause(id).await {
            Ok(()) => println!("Paused job {id}"),
            Err(e) if e.is_invalid_state() => {
                let state = engine.status(id).await?.state;
                if state.is_active() {
                    println!("Job {id} interrupted while {state}; `acquire resume {id}` continues it");
                }
            }
            Err(e) => tracing::warn!(job = id, "pause on interrupt: {e}"),
        }
    }
    Ok(())
}
