use acquire_core::logging;

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    // Log to the state file when possible, otherwise to stderr.
    if let Err(e) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::warn!("log file unavailable, logging to stderr: {e:#}");
    }

    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("acquire error: {:#}", err);
        std::process::exit(1);
    }
}
