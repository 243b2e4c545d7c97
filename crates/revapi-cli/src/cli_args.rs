use clap::{ArgAction, Parser, ValueHint};
use revapi_core::endpoint::Query;
use revapi_core::{IncidentTable, LogLevel};

use crate::middleware::InvocationOptions;

const OPERATIONS_HELP: &str = "\
Operations ((admin) requires --admin):
    create_profile (admin)          update_profile (admin)
    create_portfolio (admin)        update_portfolio (admin)
    create_plant (admin)            update_plant (admin)
    profile_list (admin)            user_list (admin)
    portfolio_list (admin)          list_plants (admin)
    post_prmt_measurements (admin)
    get_user_plants_access          get_user_portfolios_access
    plant_detail                    portfolio_detail
    get_portfolio_plants
    post_gen_measurements           post_weather_measurements
    update_gen_measurements         update_weather_measurements
    get_gen_measurements            get_weather_measurements
    get_incidents                   post_incidents
    get_hper                        generate_hper
    get_daily_availability          generate_daily_availability
    get_daily_metrics               generate_daily_metrics
    calculate_data                  recalculate_data";

/// Run a single Rev API operation.
#[derive(Parser, Debug, Clone)]
#[command(name = "revapi", version, about, long_about = None, after_help = OPERATIONS_HELP)]
pub struct Cli {
    /// Operation to run.
    #[arg(value_name = "OPERATION")]
    pub operation: String,

    /// Logging level.
    #[arg(
        short = 'l',
        long = "log-level",
        alias = "log_level",
        value_name = "LEVEL",
        default_value = "INFO",
        value_parser = parse_log_level
    )]
    pub log_level: LogLevel,

    /// Act as the admin identity.
    #[arg(short = 'A', long, action = ArgAction::SetTrue)]
    pub admin: bool,

    /// Ask for start_date/end_date instead of a single date.
    #[arg(short = 'r', long, action = ArgAction::SetTrue)]
    pub range: bool,

    /// Request detailed listings (get_user_portfolios_access, get_portfolio_plants, list_plants).
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    pub detailed: bool,

    /// Data file for upload/update operations; prompted for when missing.
    #[arg(short = 'f', long, value_hint = ValueHint::FilePath)]
    pub file: Option<String>,

    /// Plant or portfolio id the operation targets.
    #[arg(short = 'i', long, value_parser = clap::value_parser!(u64))]
    pub id: Option<u64>,

    /// Raw query string, e.g. "?start_date=2024-01-01&end_date=2024-01-31".
    #[arg(short = 'q', long)]
    pub query: Option<String>,

    /// Incident table for post_incidents.
    #[arg(short = 't', long, value_parser = parse_table)]
    pub table: Option<IncidentTable>,
}

fn parse_log_level(raw: &str) -> Result<LogLevel, String> {
    raw.parse()
}

fn parse_table(raw: &str) -> Result<IncidentTable, String> {
    IncidentTable::parse(raw)
        .ok_or_else(|| format!("invalid table '{raw}' (expected gen or weather)"))
}

impl Cli {
    pub fn options(&self) -> InvocationOptions {
        InvocationOptions {
            detailed: self.detailed,
            range: self.range,
            file: self.file.as_deref().map(revapi_core::config::expand_path),
            id: self.id,
            query: self.query.as_deref().map(Query::parse),
            table: self.table,
        }
    }
}
