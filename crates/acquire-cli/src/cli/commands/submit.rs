//! `acquire submit <source>`: resolve the source and record a job.

use acquire_core::job::Command;
use acquire_core::SubmitOptions;
use anyhow::Result;
use std::path::PathBuf;

use super::{session, start};
use crate::cli::format;

#[derive(Debug)]
pub struct SubmitArgs {
    pub source: String,
    pub dest: PathBuf,
    pub sha256: Option<String>,
    pub chunk_size: Option<u64>,
    pub name: Option<String>,
    pub start: bool,
}

pub async fn run_submit(args: SubmitArgs) -> Result<()> {
    let session = session().await?;
    let id = session
        .engine
        .submit_with(
            &args.source,
            &args.dest,
            SubmitOptions {
                expected_digest: args.sha256,
                chunk_size: args.chunk_size,
                filename: args.name,
            },
        )
        .await?;
    let job = session.engine.job(id).await?;
    println!(
        "Submitted job {id}: {} ({}) -> {}",
        job.filename,
        format::bytes(job.total_size),
        job.destination.display()
    );
    if job.expected_digest.is_none() {
        println!("  no expected SHA-256; the digest will be computed and recorded only");
    }
    if args.start {
        start::foreground(session, &[id], Command::Start).await?;
    }
    Ok(())
}
