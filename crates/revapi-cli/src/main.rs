use std::env;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use revapi_cli::{Cli, Middleware, TerminalPrompter};
use revapi_core::{
    ApiSettings, Credential, Identity, LoggingDestination, Operation, RevApiError, connect,
    init_logging, load_config,
};
use tracing::{error, warn};

const ENV_FILE_VAR: &str = "REVAPI_ENV_FILE";

fn main() -> ExitCode {
    load_env_file();
    let cli = Cli::parse();
    if let Err(err) = init_logging(LoggingDestination::FileAndStderr, cli.log_level) {
        eprintln!("Failed to initialize logging: {err}");
    }

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(1)
        }
    }
}

fn load_env_file() {
    let loaded = match env::var(ENV_FILE_VAR) {
        Ok(path) => dotenvy::from_path(revapi_core::config::expand_path(&path)).map(|_| ()),
        Err(_) => dotenvy::dotenv().map(|_| ()),
    };
    // A missing .env is normal; variables may already be exported.
    match loaded {
        Err(err) if !err.not_found() => eprintln!("Failed to read environment file: {err}"),
        _ => {}
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let loaded = load_config();
    for warning in &loaded.warnings {
        warn!("{warning}");
    }
    let settings = ApiSettings::resolve(&loaded.config, |key| env::var(key).ok())
        .context("failed to resolve API settings")?;

    let identity = if cli.admin {
        Identity::Admin
    } else {
        Identity::User
    };

    let operation = match Operation::parse(&cli.operation)
        .and_then(|op| op.check_permission(identity).map(|()| op))
    {
        Ok(operation) => operation,
        Err(err) => {
            error!("{err}");
            return Ok(ExitCode::from(2));
        }
    };

    let credential = match Credential::from_env(identity, |key| env::var(key).ok()) {
        Ok(credential) => credential,
        Err(err) => {
            error!("{err}");
            return Ok(ExitCode::from(2));
        }
    };

    let mut client = connect(&settings, credential)?;
    if let Err(err) = client.authenticate() {
        error!("{err}");
        return Ok(exit_code_for(&err));
    }

    let mut prompter = TerminalPrompter;
    let mut middleware = Middleware::new(&client, &mut prompter, cli.options());
    match middleware.run(operation) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            error!("{err}");
            Ok(exit_code_for(&err))
        }
    }
}

fn exit_code_for(err: &RevApiError) -> ExitCode {
    match err {
        RevApiError::Connection(_)
        | RevApiError::AuthenticationFailed
        | RevApiError::PermissionDenied(_)
        | RevApiError::UnknownOperation { .. } => ExitCode::from(2),
        _ => ExitCode::from(1),
    }
}
