//! Endpoint catalogue and structured URL templating.
//!
//! Templates use named `{param}` placeholders that are resolved in a single
//! pass, with every substituted value percent-encoded. A value that happens to
//! contain placeholder syntax is therefore inserted verbatim (encoded) and never
//! re-expanded.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every remote endpoint the toolkit talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Login,
    Refresh,
    Validate,
    PlantDetail,
    PortfolioDetail,
    UserPlantsAccess,
    UserPortfoliosAccess,
    PortfolioPlants,
    GetGenMeasurements,
    GetWeatherMeasurements,
    PostGenMeasurements,
    PostWeatherMeasurements,
    PostPrmtMeasurements,
    UpdateGenMeasurements,
    UpdateWeatherMeasurements,
    GetIncidents,
    PostIncidents,
    GetHper,
    GenerateHper,
    GenerateHperResult,
    GetDailyAvailability,
    GenerateDailyAvailability,
    GenerateDailyAvailabilityResult,
    GetDailyMetrics,
    GenerateDailyMetrics,
    GenerateDailyMetricsResult,
    CalculateData,
    CalculateDataResult,
    RecalculateData,
    RecalculateDataResult,
    CreateProfile,
    ProfileList,
    UserList,
    UpdateProfile,
    CreatePortfolio,
    PortfolioList,
    UpdatePortfolio,
    CreatePlant,
    ListPlants,
    UpdatePlant,
}

impl Endpoint {
    pub const ALL: [Endpoint; 40] = [
        Endpoint::Login,
        Endpoint::Refresh,
        Endpoint::Validate,
        Endpoint::PlantDetail,
        Endpoint::PortfolioDetail,
        Endpoint::UserPlantsAccess,
        Endpoint::UserPortfoliosAccess,
        Endpoint::PortfolioPlants,
        Endpoint::GetGenMeasurements,
        Endpoint::GetWeatherMeasurements,
        Endpoint::PostGenMeasurements,
        Endpoint::PostWeatherMeasurements,
        Endpoint::PostPrmtMeasurements,
        Endpoint::UpdateGenMeasurements,
        Endpoint::UpdateWeatherMeasurements,
        Endpoint::GetIncidents,
        Endpoint::PostIncidents,
        Endpoint::GetHper,
        Endpoint::GenerateHper,
        Endpoint::GenerateHperResult,
        Endpoint::GetDailyAvailability,
        Endpoint::GenerateDailyAvailability,
        Endpoint::GenerateDailyAvailabilityResult,
        Endpoint::GetDailyMetrics,
        Endpoint::GenerateDailyMetrics,
        Endpoint::GenerateDailyMetricsResult,
        Endpoint::CalculateData,
        Endpoint::CalculateDataResult,
        Endpoint::RecalculateData,
        Endpoint::RecalculateDataResult,
        Endpoint::CreateProfile,
        Endpoint::ProfileList,
        Endpoint::UserList,
        Endpoint::UpdateProfile,
        Endpoint::CreatePortfolio,
        Endpoint::PortfolioList,
        Endpoint::UpdatePortfolio,
        Endpoint::CreatePlant,
        Endpoint::ListPlants,
        Endpoint::UpdatePlant,
    ];

    /// Path template used when the configuration file does not override it.
    pub fn default_template(self) -> &'static str {
        match self {
            Endpoint::Login => "api/auth/login/",
            Endpoint::Refresh => "api/auth/refresh/",
            Endpoint::Validate => "api/auth/validate/",
            Endpoint::PlantDetail => "api/plants/{plant}/",
            Endpoint::PortfolioDetail => "api/portfolios/{portfolio}/",
            Endpoint::UserPlantsAccess => "api/users/me/plants/",
            Endpoint::UserPortfoliosAccess => "api/users/me/portfolios/",
            Endpoint::PortfolioPlants => "api/portfolios/{portfolio}/plants/",
            Endpoint::GetGenMeasurements => "api/plants/{plant}/measurements/gen/",
            Endpoint::GetWeatherMeasurements => "api/plants/{plant}/measurements/weather/",
            Endpoint::PostGenMeasurements => "api/plants/{plant}/measurements/gen/upload/",
            Endpoint::PostWeatherMeasurements => {
                "api/plants/{plant}/measurements/weather/upload/"
            }
            Endpoint::PostPrmtMeasurements => "api/plants/{plant}/measurements/prmt/upload/",
            Endpoint::UpdateGenMeasurements => "api/plants/{plant}/measurements/gen/update/",
            Endpoint::UpdateWeatherMeasurements => {
                "api/plants/{plant}/measurements/weather/update/"
            }
            Endpoint::GetIncidents => "api/plants/{plant}/incidents/",
            Endpoint::PostIncidents => "api/plants/{plant}/incidents/{table}/",
            Endpoint::GetHper => "api/plants/{plant}/hper/",
            Endpoint::GenerateHper => "api/plants/{plant}/hper/generate/",
            Endpoint::GenerateHperResult => "api/plants/{plant}/hper/generate/result/",
            Endpoint::GetDailyAvailability => "api/plants/{plant}/availability/",
            Endpoint::GenerateDailyAvailability => "api/plants/{plant}/availability/generate/",
            Endpoint::GenerateDailyAvailabilityResult => {
                "api/plants/{plant}/availability/generate/result/"
            }
            Endpoint::GetDailyMetrics => "api/plants/{plant}/metrics/",
            Endpoint::GenerateDailyMetrics => "api/plants/{plant}/metrics/generate/",
            Endpoint::GenerateDailyMetricsResult => "api/plants/{plant}/metrics/generate/result/",
            Endpoint::CalculateData => "api/plants/{plant}/data/calculate/",
            Endpoint::CalculateDataResult => "api/plants/{plant}/data/calculate/result/",
            Endpoint::RecalculateData => "api/plants/{plant}/data/recalculate/",
            Endpoint::RecalculateDataResult => "api/plants/{plant}/data/recalculate/result/",
            Endpoint::CreateProfile => "api/admin/profiles/create/",
            Endpoint::ProfileList => "api/admin/profiles/",
            Endpoint::UserList => "api/admin/users/",
            Endpoint::UpdateProfile => "api/admin/profiles/{profile}/",
            Endpoint::CreatePortfolio => "api/admin/portfolios/create/",
            Endpoint::PortfolioList => "api/admin/portfolios/",
            Endpoint::UpdatePortfolio => "api/admin/portfolios/{portfolio}/",
            Endpoint::CreatePlant => "api/admin/plants/create/",
            Endpoint::ListPlants => "api/admin/plants/",
            Endpoint::UpdatePlant => "api/admin/plants/{plant}/",
        }
    }

    pub fn from_key(key: &str) -> Option<Endpoint> {
        Endpoint::ALL
            .into_iter()
            .find(|endpoint| endpoint.key() == key.trim())
    }

    pub fn key(self) -> &'static str {
        match self {
            Endpoint::Login => "login",
            Endpoint::Refresh => "refresh",
            Endpoint::Validate => "validate",
            Endpoint::PlantDetail => "plant_detail",
            Endpoint::PortfolioDetail => "portfolio_detail",
            Endpoint::UserPlantsAccess => "user_plants_access",
            Endpoint::UserPortfoliosAccess => "user_portfolios_access",
            Endpoint::PortfolioPlants => "portfolio_plants",
            Endpoint::GetGenMeasurements => "get_gen_measurements",
            Endpoint::GetWeatherMeasurements => "get_weather_measurements",
            Endpoint::PostGenMeasurements => "post_gen_measurements",
            Endpoint::PostWeatherMeasurements => "post_weather_measurements",
            Endpoint::PostPrmtMeasurements => "post_prmt_measurements",
            Endpoint::UpdateGenMeasurements => "update_gen_measurements",
            Endpoint::UpdateWeatherMeasurements => "update_weather_measurements",
            Endpoint::GetIncidents => "get_incidents",
            Endpoint::PostIncidents => "post_incidents",
            Endpoint::GetHper => "get_hper",
            Endpoint::GenerateHper => "generate_hper",
            Endpoint::GenerateHperResult => "generate_hper_result",
            Endpoint::GetDailyAvailability => "get_daily_availability",
            Endpoint::GenerateDailyAvailability => "generate_daily_availability",
            Endpoint::GenerateDailyAvailabilityResult => "generate_daily_availability_result",
            Endpoint::GetDailyMetrics => "get_daily_metrics",
            Endpoint::GenerateDailyMetrics => "generate_daily_metrics",
            Endpoint::GenerateDailyMetricsResult => "generate_daily_metrics_result",
            Endpoint::CalculateData => "calculate_data",
            Endpoint::CalculateDataResult => "calculate_data_result",
            Endpoint::RecalculateData => "recalculate_data",
            Endpoint::RecalculateDataResult => "recalculate_data_result",
            Endpoint::CreateProfile => "create_profile",
            Endpoint::ProfileList => "profile_list",
            Endpoint::UserList => "user_list",
            Endpoint::UpdateProfile => "update_profile",
            Endpoint::CreatePortfolio => "create_portfolio",
            Endpoint::PortfolioList => "portfolio_list",
            Endpoint::UpdatePortfolio => "update_portfolio",
            Endpoint::CreatePlant => "create_plant",
            Endpoint::ListPlants => "list_plants",
            Endpoint::UpdatePlant => "update_plant",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Endpoint templates with per-endpoint overrides on top of the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointTable {
    overrides: BTreeMap<Endpoint, String>,
}

impl EndpointTable {
    pub fn new(overrides: BTreeMap<Endpoint, String>) -> Self {
        Self { overrides }
    }

    pub fn template(&self, endpoint: Endpoint) -> &str {
        self.overrides
            .get(&endpoint)
            .map(String::as_str)
            .unwrap_or_else(|| endpoint.default_template())
    }

    /// Parse every template so malformed overrides surface at startup.
    pub fn validate(&self) -> Result<(), TemplateError> {
        for endpoint in Endpoint::ALL {
            UrlTemplate::parse(self.template(endpoint))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unterminated placeholder in template '{0}'")]
    Unterminated(String),
    #[error("empty placeholder in template '{0}'")]
    EmptyPlaceholder(String),
    #[error("missing value for placeholder '{{{name}}}' in template '{template}'")]
    MissingParam { name: String, template: String },
    #[error("cannot join '{path}' onto base URL: {reason}")]
    Join { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed path template such as `api/plants/{plant}/incidents/{table}/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl UrlTemplate {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = raw;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| TemplateError::Unterminated(raw.to_string()))?;
            let name = after[..close].trim();
            if name.is_empty() {
                return Err(TemplateError::EmptyPlaceholder(raw.to_string()));
            }
            segments.push(Segment::Param(name.to_string()));
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute `params` into the template, percent-encoding each value.
    pub fn render(&self, params: &[(&str, &str)]) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Param(name) => {
                    let value = params
                        .iter()
                        .find(|(key, _)| key == name)
                        .map(|(_, value)| *value)
                        .ok_or_else(|| TemplateError::MissingParam {
                            name: name.clone(),
                            template: self.raw.clone(),
                        })?;
                    out.push_str(&urlencoding::encode(value));
                }
            }
        }
        Ok(out)
    }
}

/// Ordered query-string parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// `?detailed=True` style flag, matching what the server expects.
    pub fn detailed(detailed: bool) -> Self {
        Self::new().with("detailed", if detailed { "True" } else { "False" })
    }

    /// Parse a raw query string such as `?start_date=2024-01-01&end_date=2024-01-31`.
    ///
    /// Keys and values are percent-decoded; pairs without `=` get an empty value.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim().trim_start_matches('?');
        let pairs = trimmed
            .split('&')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let (key, value) = part.split_once('=').unwrap_or((part, ""));
                (decode_component(key), decode_component(value))
            })
            .collect();
        Self { pairs }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Encoded form without the leading `?`.
    pub fn encode(&self) -> String {
        self.pairs
            .iter()
            .map(|(key, value)| {
                format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

/// Join a rendered template onto `base` (URL-join semantics) and attach `query`.
pub fn build_url(
    base: &Url,
    template: &str,
    params: &[(&str, &str)],
    query: Option<&Query>,
) -> Result<Url, TemplateError> {
    let path = UrlTemplate::parse(template)?.render(params)?;
    let mut url = base.join(&path).map_err(|err| TemplateError::Join {
        path: path.clone(),
        reason: err.to_string(),
    })?;
    if let Some(query) = query.filter(|query| !query.is_empty()) {
        url.set_query(Some(&query.encode()));
    }
    Ok(url)
}
