pub mod config;
pub mod error;
pub mod fetch;
pub mod prmt;
pub mod sync;

use std::env;

use revapi_core::{
    ApiSettings, Credential, HttpTransport, Identity, PlantDirectory, RevClient, connect,
    load_config,
};
use tracing::{info, warn};

use config::{CliArgs, Command, PrmtArgs, SyncArgs, Tunables};
use error::PipelineError;
use fetch::PrmtConsumer;
use prmt::PrmtPipeline;
use sync::{CommandImputer, CommandSource, DataPipeline, DateWindow};

pub fn run(cli: CliArgs) -> Result<(), PipelineError> {
    let lookup = |key: &str| env::var(key).ok();
    let plants_path = cli
        .plants_file
        .clone()
        .unwrap_or_else(|| PlantDirectory::default_path(lookup));
    let directory = PlantDirectory::load(&plants_path)?;

    let loaded = load_config();
    for warning in &loaded.warnings {
        warn!("{warning}");
    }
    let settings = ApiSettings::resolve(&loaded.config, lookup)?;

    match cli.command {
        Command::Prmt(args) => run_prmt(&directory, &settings, args),
        Command::Sync(args) => run_sync(&directory, &settings, args),
    }
}

fn authenticated_client(
    settings: &ApiSettings,
    identity: Identity,
) -> Result<RevClient<HttpTransport>, PipelineError> {
    let credential = Credential::from_env(identity, |key| env::var(key).ok())?;
    let mut client = connect(settings, credential)?;
    client.authenticate()?;
    Ok(client)
}

fn run_prmt(
    directory: &PlantDirectory,
    settings: &ApiSettings,
    args: PrmtArgs,
) -> Result<(), PipelineError> {
    let period = fetch::period(args.year, args.month)?;
    let mut pipeline = PrmtPipeline::new(directory, &args.plants, period)?;
    let tunables = Tunables::from_env(|key| env::var(key).ok())?;
    let transport = HttpTransport::new(settings.request_timeout)?;
    let consumer = PrmtConsumer::new(transport, tunables).with_channels(args.channels);

    let downloaded = pipeline.download(&consumer, args.format, &args.output_dir);
    let saved = downloaded.iter().flatten().count();
    info!(saved, period = pipeline.period(), "PRMT download finished");

    if !args.upload {
        info!("Upload not requested");
        return Ok(());
    }
    let client = authenticated_client(settings, Identity::Admin)?;
    let outcomes = pipeline.upload(&client)?;
    let failed = outcomes
        .iter()
        .filter(|(_, outcome)| !outcome.is_completed())
        .count();
    if failed > 0 {
        return Err(PipelineError::message(format!(
            "{failed} of {} PRMT uploads failed",
            outcomes.len()
        )));
    }
    Ok(())
}

fn run_sync(
    directory: &PlantDirectory,
    settings: &ApiSettings,
    args: SyncArgs,
) -> Result<(), PipelineError> {
    let window = DateWindow::new(args.date, args.start_date, args.end_date)?;
    let mut pipeline = DataPipeline::new(directory, &args.plants, window)?;
    let client = authenticated_client(settings, Identity::User)?;

    let reports = pipeline.sync(
        &CommandSource::new(args.downloader),
        &CommandImputer::new(args.imputer),
        &client,
        args.keep_files,
    )?;

    let incomplete: Vec<&str> = reports
        .iter()
        .filter(|report| !report.is_complete())
        .map(|report| report.plant.as_str())
        .collect();
    if incomplete.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::message(format!(
            "sync incomplete for {}",
            incomplete.join(", ")
        )))
    }
}
