use rdm_core::{logging, transport};

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    if let Err(err) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::warn!("file logging unavailable, using stderr: {:#}", err);
    }
    transport::init();

    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("rdm error: {:#}", err);
        std::process::exit(1);
    }
}
