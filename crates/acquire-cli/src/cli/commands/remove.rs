//! `acquire remove <id>`: forget a terminal job, optionally deleting its files.

use anyhow::Result;

use super::session;

pub async fn run_remove(id: i64, delete_files: bool) -> Result<()> {
    let engine = session().await?.engine;
    engine.remove(id, delete_files).await?;
    if delete_files {
        println!("Removed job {id} and its files");
    } else {
        println!("Removed job {id}");
    }
    Ok(())
}
