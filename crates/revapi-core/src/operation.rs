//! Catalogue of the operations exposed by the administrative CLI.

use std::fmt;
use std::str::FromStr;

use crate::config::Identity;
use crate::error::{RevApiError, closest_match};
use crate::tasks::TaskKind;

/// Entity an operation's `--id` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Plant,
    Portfolio,
    Profile,
}

impl IdKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IdKind::Plant => "plant",
            IdKind::Portfolio => "portfolio",
            IdKind::Profile => "profile",
        }
    }
}

/// Interactive form backing an admin create/update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Profile,
    Portfolio,
    Plant,
}

/// What an operation needs from the caller before it can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationShape {
    /// Interactive form; `update` additionally asks for the target id.
    Form { kind: FormKind, update: bool },
    NoArgument,
    ById(IdKind),
    ByIdWithData(IdKind),
    ByIdWithQuery,
    Incidents,
    Task(TaskKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateProfile,
    UpdateProfile,
    CreatePortfolio,
    UpdatePortfolio,
    CreatePlant,
    UpdatePlant,
    ProfileList,
    UserList,
    PortfolioList,
    ListPlants,
    PostPrmtMeasurements,
    GetUserPlantsAccess,
    GetUserPortfoliosAccess,
    PlantDetail,
    PortfolioDetail,
    GetPortfolioPlants,
    GetGenMeasurements,
    GetWeatherMeasurements,
    PostGenMeasurements,
    PostWeatherMeasurements,
    UpdateGenMeasurements,
    UpdateWeatherMeasurements,
    GetIncidents,
    PostIncidents,
    GetHper,
    GetDailyAvailability,
    GetDailyMetrics,
    GenerateHper,
    GenerateDailyAvailability,
    GenerateDailyMetrics,
    CalculateData,
    RecalculateData,
}

impl Operation {
    pub const ALL: [Operation; 32] = [
        Operation::CreateProfile,
        Operation::UpdateProfile,
        Operation::CreatePortfolio,
        Operation::UpdatePortfolio,
        Operation::CreatePlant,
        Operation::UpdatePlant,
        Operation::ProfileList,
        Operation::UserList,
        Operation::PortfolioList,
        Operation::ListPlants,
        Operation::PostPrmtMeasurements,
        Operation::GetUserPlantsAccess,
        Operation::GetUserPortfoliosAccess,
        Operation::PlantDetail,
        Operation::PortfolioDetail,
        Operation::GetPortfolioPlants,
        Operation::GetGenMeasurements,
        Operation::GetWeatherMeasurements,
        Operation::PostGenMeasurements,
        Operation::PostWeatherMeasurements,
        Operation::UpdateGenMeasurements,
        Operation::UpdateWeatherMeasurements,
        Operation::GetIncidents,
        Operation::PostIncidents,
        Operation::GetHper,
        Operation::GetDailyAvailability,
        Operation::GetDailyMetrics,
        Operation::GenerateHper,
        Operation::GenerateDailyAvailability,
        Operation::GenerateDailyMetrics,
        Operation::CalculateData,
        Operation::RecalculateData,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::CreateProfile => "create_profile",
            Operation::UpdateProfile => "update_profile",
            Operation::CreatePortfolio => "create_portfolio",
            Operation::UpdatePortfolio => "update_portfolio",
            Operation::CreatePlant => "create_plant",
            Operation::UpdatePlant => "update_plant",
            Operation::ProfileList => "profile_list",
            Operation::UserList => "user_list",
            Operation::PortfolioList => "portfolio_list",
            Operation::ListPlants => "list_plants",
            Operation::PostPrmtMeasurements => "post_prmt_measurements",
            Operation::GetUserPlantsAccess => "get_user_plants_access",
            Operation::GetUserPortfoliosAccess => "get_user_portfolios_access",
            Operation::PlantDetail => "plant_detail",
            Operation::PortfolioDetail => "portfolio_detail",
            Operation::GetPortfolioPlants => "get_portfolio_plants",
            Operation::GetGenMeasurements => "get_gen_measurements",
            Operation::GetWeatherMeasurements => "get_weather_measurements",
            Operation::PostGenMeasurements => "post_gen_measurements",
            Operation::PostWeatherMeasurements => "post_weather_measurements",
            Operation::UpdateGenMeasurements => "update_gen_measurements",
            Operation::UpdateWeatherMeasurements => "update_weather_measurements",
            Operation::GetIncidents => "get_incidents",
            Operation::PostIncidents => "post_incidents",
            Operation::GetHper => "get_hper",
            Operation::GetDailyAvailability => "get_daily_availability",
            Operation::GetDailyMetrics => "get_daily_metrics",
            Operation::GenerateHper => "generate_hper",
            Operation::GenerateDailyAvailability => "generate_daily_availability",
            Operation::GenerateDailyMetrics => "generate_daily_metrics",
            Operation::CalculateData => "calculate_data",
            Operation::RecalculateData => "recalculate_data",
        }
    }

    /// Resolve an operation name, suggesting the closest known one on a miss.
    pub fn parse(name: &str) -> Result<Self, RevApiError> {
        let needle = name.trim();
        Operation::ALL
            .into_iter()
            .find(|operation| operation.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| RevApiError::UnknownOperation {
                name: needle.to_string(),
                suggestion: closest_match(
                    needle,
                    Operation::ALL.iter().map(|operation| operation.as_str()),
                ),
            })
    }

    pub fn requires_admin(self) -> bool {
        matches!(
            self,
            Operation::CreateProfile
                | Operation::UpdateProfile
                | Operation::CreatePortfolio
                | Operation::UpdatePortfolio
                | Operation::CreatePlant
                | Operation::UpdatePlant
                | Operation::ProfileList
                | Operation::UserList
                | Operation::PortfolioList
                | Operation::ListPlants
                | Operation::PostPrmtMeasurements
        )
    }

    pub fn check_permission(self, identity: Identity) -> Result<(), RevApiError> {
        if self.requires_admin() && identity != Identity::Admin {
            return Err(RevApiError::PermissionDenied(self));
        }
        Ok(())
    }

    pub fn shape(self) -> OperationShape {
        use OperationShape::*;
        match self {
            Operation::CreateProfile => Form {
                kind: FormKind::Profile,
                update: false,
            },
            Operation::UpdateProfile => Form {
                kind: FormKind::Profile,
                update: true,
            },
            Operation::CreatePortfolio => Form {
                kind: FormKind::Portfolio,
                update: false,
            },
            Operation::UpdatePortfolio => Form {
                kind: FormKind::Portfolio,
                update: true,
            },
            Operation::CreatePlant => Form {
                kind: FormKind::Plant,
                update: false,
            },
            Operation::UpdatePlant => Form {
                kind: FormKind::Plant,
                update: true,
            },
            Operation::ProfileList
            | Operation::UserList
            | Operation::PortfolioList
            | Operation::ListPlants
            | Operation::GetUserPlantsAccess
            | Operation::GetUserPortfoliosAccess => NoArgument,
            Operation::PlantDetail => ById(IdKind::Plant),
            Operation::PortfolioDetail | Operation::GetPortfolioPlants => {
                ById(IdKind::Portfolio)
            }
            Operation::PostGenMeasurements
            | Operation::PostWeatherMeasurements
            | Operation::PostPrmtMeasurements
            | Operation::UpdateGenMeasurements
            | Operation::UpdateWeatherMeasurements => ByIdWithData(IdKind::Plant),
            Operation::GetGenMeasurements
            | Operation::GetWeatherMeasurements
            | Operation::GetIncidents
            | Operation::GetHper
            | Operation::GetDailyAvailability
            | Operation::GetDailyMetrics => ByIdWithQuery,
            Operation::PostIncidents => Incidents,
            Operation::GenerateHper => Task(TaskKind::Hper),
            Operation::GenerateDailyAvailability => Task(TaskKind::DailyAvailability),
            Operation::GenerateDailyMetrics => Task(TaskKind::DailyMetrics),
            Operation::CalculateData => Task(TaskKind::CalculateData),
            Operation::RecalculateData => Task(TaskKind::RecalculateData),
        }
    }

    /// Whether `--detailed` changes the request.
    pub fn supports_detailed(self) -> bool {
        matches!(
            self,
            Operation::GetUserPortfoliosAccess
                | Operation::GetPortfolioPlants
                | Operation::ListPlants
        )
    }

    /// Query parameters prompted for when no `--query` was given.
    pub fn query_params(self, range: bool) -> Vec<&'static str> {
        let mut params = if range {
            vec!["start_date", "end_date"]
        } else {
            vec!["date"]
        };
        match self {
            Operation::GetIncidents => params.push("unapplied"),
            Operation::RecalculateData => params.push("force"),
            _ => {}
        }
        params
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = RevApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::parse(s)
    }
}
