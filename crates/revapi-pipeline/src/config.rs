use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use revapi_core::{LogLevel, OutputFormat};

use crate::error::PipelineError;

pub const DEFAULT_OUTPUT_DIR: &str = "prmt_data";
pub const DEFAULT_CHANNELS: &str = "1,2,3,4";

/// Batch jobs that move plant data into the Rev API.
#[derive(Debug, Parser, Clone)]
#[command(author, version, about = "Download plant measurements and push them to the Rev API")]
pub struct CliArgs {
    /// Logging level.
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        value_name = "LEVEL",
        default_value = "INFO",
        value_parser = parse_log_level
    )]
    pub log_level: LogLevel,

    /// Plant directory (defaults to REVAPI_PLANTS or plants.toml in the config dir).
    #[arg(long = "plants-file", global = true, value_name = "FILE")]
    pub plants_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Download monthly PRMT readings and optionally upload them.
    Prmt(PrmtArgs),
    /// Download, impute and upload gen/weather data for a date or range.
    Sync(SyncArgs),
}

#[derive(Debug, Args, Clone)]
pub struct PrmtArgs {
    /// Plant names, comma separated.
    #[arg(short = 'p', long, value_delimiter = ',', required = true)]
    pub plants: Vec<String>,

    /// Year of the period (YYYY).
    #[arg(short = 'y', long)]
    pub year: i32,

    /// Month of the period (MM).
    #[arg(short = 'm', long)]
    pub month: u32,

    /// File format written for each plant.
    #[arg(long, default_value = "json")]
    pub format: OutputFormat,

    /// Directory the downloaded files are written to.
    #[arg(short = 'o', long = "output-dir", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Meter channels requested from the PRMT service.
    #[arg(long, default_value = DEFAULT_CHANNELS)]
    pub channels: String,

    /// Upload every downloaded file through post_prmt_measurements (admin).
    #[arg(long)]
    pub upload: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SyncArgs {
    /// Plant names, comma separated.
    #[arg(short = 'p', long, value_delimiter = ',', required = true)]
    pub plants: Vec<String>,

    /// Single day to process (YYYY-MM-DD).
    #[arg(short = 'd', long, conflicts_with_all = ["start_date", "end_date"])]
    pub date: Option<NaiveDate>,

    /// First day of the range (YYYY-MM-DD).
    #[arg(long = "start-date", requires = "end_date")]
    pub start_date: Option<NaiveDate>,

    /// Last day of the range (YYYY-MM-DD).
    #[arg(long = "end-date", requires = "start_date")]
    pub end_date: Option<NaiveDate>,

    /// Program that downloads gen/weather files; prints both paths.
    #[arg(long, env = "REVAPI_DOWNLOADER")]
    pub downloader: String,

    /// Program that imputes a file; prints imputed and incidents paths.
    #[arg(long, env = "REVAPI_IMPUTER")]
    pub imputer: String,

    /// Keep intermediate files instead of removing them after upload.
    #[arg(long)]
    pub keep_files: bool,
}

fn parse_log_level(raw: &str) -> Result<LogLevel, String> {
    raw.parse()
}

/// Knobs for the PRMT service, read from the environment.
#[derive(Debug, Clone)]
pub struct Tunables {
    pub cen_api_url: String,
    pub medidas_url: String,
    pub api_key: String,
    pub max_retries: usize,
    pub retry_backoff_ms: u64,
}

impl Tunables {
    pub fn from_env<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| PipelineError::Config(format!("{var} is not set")))
        };

        let cen_api_url = required("CEN_API_URL")?;
        let medidas_url = required("MEDIDAS_URL")?;
        let api_key = required("API_KEY")?;
        let max_retries = parse_env(&lookup, "PRMT_MAX_RETRIES", 3usize)?;
        let retry_backoff_ms = parse_env(&lookup, "PRMT_RETRY_BACKOFF_MS", 1_000u64)?;

        Ok(Self {
            cen_api_url,
            medidas_url,
            api_key,
            max_retries,
            retry_backoff_ms,
        })
    }

    /// Service root and measurements path joined without doubling the slash.
    pub fn measurements_url(&self) -> String {
        format!(
            "{}/{}",
            self.cen_api_url.trim_end_matches('/'),
            self.medidas_url.trim_start_matches('/')
        )
    }
}

fn parse_env<F, T>(lookup: &F, var: &str, default: T) -> Result<T, PipelineError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|err| PipelineError::Config(format!("invalid value for {var}: {err}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn tunables_default_retry_policy() {
        let tunables = Tunables::from_env(env(&[
            ("CEN_API_URL", "https://cen.example.com/api/"),
            ("MEDIDAS_URL", "/v1/medidas"),
            ("API_KEY", "k"),
        ]))
        .unwrap();
        assert_eq!(tunables.max_retries, 3);
        assert_eq!(tunables.retry_backoff_ms, 1_000);
        assert_eq!(
            tunables.measurements_url(),
            "https://cen.example.com/api/v1/medidas"
        );
    }

    #[test]
    fn missing_key_and_bad_numbers_are_config_errors() {
        let err = Tunables::from_env(env(&[
            ("CEN_API_URL", "https://cen.example.com"),
            ("MEDIDAS_URL", "medidas"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("API_KEY"));

        let err = Tunables::from_env(env(&[
            ("CEN_API_URL", "https://cen.example.com"),
            ("MEDIDAS_URL", "medidas"),
            ("API_KEY", "k"),
            ("PRMT_MAX_RETRIES", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PRMT_MAX_RETRIES"));
    }

    #[test]
    fn sync_accepts_date_or_range() {
        let args = CliArgs::try_parse_from([
            "revapi-pipeline",
            "sync",
            "-p",
            "Margarita,Duqueco",
            "--start-date",
            "2024-01-01",
            "--end-date",
            "2024-01-07",
            "--downloader",
            "fetch-plant",
            "--imputer",
            "impute",
        ])
        .unwrap();
        let Command::Sync(sync) = args.command else {
            panic!("expected sync");
        };
        assert_eq!(sync.plants, vec!["Margarita", "Duqueco"]);
        assert!(sync.date.is_none());

        assert!(
            CliArgs::try_parse_from([
                "revapi-pipeline",
                "sync",
                "-p",
                "Margarita",
                "--start-date",
                "2024-01-01",
                "--downloader",
                "a",
                "--imputer",
                "b",
            ])
            .is_err()
        );
    }

    #[test]
    fn prmt_parses_format_and_upload() {
        let args = CliArgs::try_parse_from([
            "revapi-pipeline",
            "-l",
            "DEBUG",
            "prmt",
            "-p",
            "Margarita",
            "-y",
            "2024",
            "-m",
            "3",
            "--format",
            "csv",
            "--upload",
        ])
        .unwrap();
        assert_eq!(args.log_level, LogLevel::Debug);
        let Command::Prmt(prmt) = args.command else {
            panic!("expected prmt");
        };
        assert_eq!(prmt.format, OutputFormat::Csv);
        assert!(prmt.upload);
        assert_eq!(prmt.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
    }
}
