use std::process::ExitCode;

use clap::Parser;
use revapi_core::{LoggingDestination, init_logging};
use revapi_pipeline::config::CliArgs;
use tracing::error;

fn main() -> ExitCode {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("Failed to read .env: {err}");
        }
    }
    let cli = CliArgs::parse();
    if let Err(err) = init_logging(LoggingDestination::FileAndStderr, cli.log_level) {
        eprintln!("Failed to initialize logging: {err}");
    }

    match revapi_pipeline::run(cli).map_err(anyhow::Error::from) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("pipeline failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
