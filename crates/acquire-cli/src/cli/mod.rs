//! CLI for the acquire engine.

mod commands;
mod control_socket;
mod format;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use commands::{
    run_cancel, run_checksum, run_completions, run_extract, run_list, run_pause, run_remove,
    run_resume, run_start, run_status, run_submit, SubmitArgs,
};

/// Top-level CLI for acquire.
#[derive(Debug, Parser)]
#[command(name = "acquire")]
#[command(about = "acquire: resumable, verified large-file downloads", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Resolve a source and record a new job.
    Submit {
        /// URL or share link of the archive.
        source: String,

        /// Directory the archive and its extracted contents go to (default: current directory).
        #[arg(long, short = 'd', value_name = "DIR")]
        dest: Option<PathBuf>,

        /// Expected SHA-256 of the archive (hex).
        #[arg(long, value_name = "HEX")]
        sha256: Option<String>,

        /// Range size in bytes for this job (default from config).
        #[arg(long, value_name = "BYTES")]
        chunk_size: Option<u64>,

        /// Local archive name (default: name reported by the server).
        #[arg(long, value_name = "NAME")]
        name: Option<String>,

        /// Start the job right away in the foreground.
        #[arg(long)]
        start: bool,
    },

    /// Start created or paused jobs and follow them in the foreground.
    Start {
        /// Job identifiers.
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Pause a downloading job.
    Pause {
        /// Job identifier.
        id: i64,
    },

    /// Resume paused jobs and follow them in the foreground.
    Resume {
        /// Job identifiers.
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Cancel a job that has not finished.
    Cancel {
        /// Job identifier.
        id: i64,
    },

    /// Remove a finished, failed or cancelled job.
    Remove {
        /// Job identifier.
        id: i64,

        /// Also delete the part file, the archive and the extracted entries.
        #[arg(long)]
        delete_files: bool,
    },

    /// Show detailed status of one job, or of every job.
    Status {
        /// Job identifier.
        id: Option<i64>,
    },

    /// List all jobs, newest first.
    List,

    /// Compute SHA-256 of a file.
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },

    /// Extract a ZIP archive into a directory, skipping entries already staged.
    Extract {
        /// Path to the archive.
        archive: PathBuf,
        /// Destination directory.
        dest: PathBuf,
    },

    /// Print shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        cli.command.run().await
    }

    async fn run(self) -> Result<()> {
        match self {
            CliCommand::Submit {
                source,
                dest,
                sha256,
                chunk_size,
                name,
                start,
            } => {
                let dest = match dest {
                    Some(d) => d,
                    None => std::env::current_dir()?,
                };
                run_submit(SubmitArgs {
                    source,
                    dest,
                    sha256,
                    chunk_size,
                    name,
                    start,
                })
                .await?
            }
            CliCommand::Start { ids } => run_start(&ids).await?,
            CliCommand::Pause { id } => run_pause(id).await?,
            CliCommand::Resume { ids } => run_resume(&ids).await?,
            CliCommand::Cancel { id } => run_cancel(id).await?,
            CliCommand::Remove { id, delete_files } => run_remove(id, delete_files).await?,
            CliCommand::Status { id } => run_status(id).await?,
            CliCommand::List => run_list().await?,
            CliCommand::Checksum { path } => run_checksum(&path).await?,
            CliCommand::Extract { archive, dest } => run_extract(&archive, &dest).await?,
            CliCommand::Completions { shell } => run_completions(shell),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
