//! `acquire status [id]` and `acquire list`.

use anyhow::Result;

use super::session;
use crate::cli::format;

pub async fn run_status(id: Option<i64>) -> Result<()> {
    let engine = session().await?.engine;
    let ids: Vec<i64> = match id {
        Some(id) => vec![id],
        None => engine.list().await?.iter().map(|j| j.id).collect(),
    };
    if ids.is_empty() {
        println!("No jobs.");
    }
    for id in ids {
        print!("{}", format::status_block(&engine.status(id).await?));
    }
    Ok(())
}

pub async fn run_list() -> Result<()> {
    let jobs = session().await?.engine.list().await?;
    if jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }
    println!("{}", format::summary_header());
    for j in &jobs {
        println!("{}", format::summary_row(j));
    }
    Ok(())
}
