use plget_core::logging;

mod cli;
mod ytdlp;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    // File logging first; a read-only state dir should not stop the CLI.
    if let Err(e) = logging::init_logging(None) {
        logging::init_logging_stderr();
        tracing::warn!("file logging unavailable, using stderr: {:#}", e);
    }

    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("plget error: {:#}", err);
        std::process::exit(1);
    }
}
