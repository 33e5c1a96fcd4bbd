//! `acquire extract <archive> <dir>`: stage an archive outside of a job.

use acquire_core::config;
use acquire_core::stager::{self, EntryOutcome, StagingOptions};
use anyhow::Result;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub async fn run_extract(archive: &Path, dest: &Path) -> Result<()> {
    let cfg = config::load_or_init()?;
    let opts = StagingOptions {
        buffer_size: cfg.verify_buffer_bytes,
        entry_retries: cfg.staging_entry_retries,
    };
    let stop = Arc::new(AtomicBool::new(false));
    let on_interrupt = {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.store(true, Ordering::SeqCst);
            }
        })
    };

    let (archive_owned, dest_owned) = (archive.to_path_buf(), dest.to_path_buf());
    let flag = Arc::clone(&stop);
    let staged = tokio::task::spawn_blocking(move || {
        stager::extract(
            &archive_owned,
            &dest_owned,
            &opts,
            &|| flag.load(Ordering::SeqCst),
            &mut |p| {
                print!("\r  entries {}/{}", p.entries_done, p.entries_total);
                let _ = std::io::stdout().flush();
            },
        )
    })
    .await?;
    on_interrupt.abort();
    println!();

    let result = staged?;
    let extracted = result.count(|o| *o == EntryOutcome::Extracted);
    let skipped = result.count(|o| *o == EntryOutcome::Skipped);
    println!(
        "Staged {} into {}: {extracted} extracted, {skipped} already present",
        archive.display(),
        dest.display()
    );
    let failed: Vec<_> = result.failed().collect();
    if !failed.is_empty() {
        for e in &failed {
            if let EntryOutcome::Failed(why) = &e.outcome {
                eprintln!("  {}: {why}", e.name);
            }
        }
        anyhow::bail!("{} entries failed", failed.len());
    }
    Ok(())
}
