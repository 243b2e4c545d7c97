//! Plant name lookups: API ids, data operators and PRMT measurement points.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::{ConfigError, config_directory, expand_path};
use crate::error::{RevApiError, closest_match};

pub const PLANTS_FILE_NAME: &str = "plants.toml";
pub const PLANTS_PATH_VAR: &str = "REVAPI_PLANTS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlantEntry {
    pub id: u64,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub measurement_point: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PlantsFile {
    #[serde(default)]
    plants: BTreeMap<String, PlantEntry>,
}

/// Name-keyed plant table loaded from `plants.toml`.
#[derive(Debug, Clone, Default)]
pub struct PlantDirectory {
    plants: BTreeMap<String, PlantEntry>,
}

impl PlantDirectory {
    pub fn new(plants: BTreeMap<String, PlantEntry>) -> Self {
        Self { plants }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: PlantsFile = toml::from_str(raw)
            .map_err(|err| ConfigError::Invalid(format!("invalid plant directory: {err}")))?;
        Ok(Self::new(file.plants))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// `plants.toml` next to `config.toml`, or `REVAPI_PLANTS` when set.
    pub fn default_path<F>(lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(PLANTS_PATH_VAR)
            .filter(|value| !value.trim().is_empty())
            .map(|value| expand_path(&value))
            .unwrap_or_else(|| config_directory().join(PLANTS_FILE_NAME))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plants.keys().map(String::as_str)
    }

    pub fn entry(&self, name: &str) -> Result<&PlantEntry, RevApiError> {
        let name = name.trim();
        self.plants
            .get(name)
            .ok_or_else(|| RevApiError::InvalidPlant {
                name: name.to_string(),
                suggestion: closest_match(name, self.names()),
            })
    }

    pub fn plant_id(&self, name: &str) -> Result<u64, RevApiError> {
        self.entry(name).map(|entry| entry.id)
    }

    /// Operator whose downloader serves `name`.
    pub fn operator(&self, name: &str) -> Result<&str, RevApiError> {
        let entry = self.entry(name)?;
        entry
            .operator
            .as_deref()
            .ok_or_else(|| RevApiError::InvalidPlant {
                name: format!("{} (no operator configured)", name.trim()),
                suggestion: None,
            })
    }

    pub fn measurement_point(&self, name: &str) -> Result<&str, RevApiError> {
        let entry = self.entry(name)?;
        entry
            .measurement_point
            .as_deref()
            .ok_or_else(|| RevApiError::InvalidPlant {
                name: format!("{} (no PRMT measurement point configured)", name.trim()),
                suggestion: None,
            })
    }

    /// Resolve every name up front so a typo fails before any download starts.
    pub fn resolve_ids<'a, I>(&self, names: I) -> Result<Vec<u64>, RevApiError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names.into_iter().map(|name| self.plant_id(name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[plants.Margarita]
id = 12
operator = "solarview"
measurement_point = "MRCHIGUE_013_PMGD5_TPE"

[plants.Duqueco]
id = 7
measurement_point = "DUQUECO_023_PMGD4_CCS"
"#;

    #[test]
    fn lookups_by_name() {
        let directory = PlantDirectory::from_toml_str(SAMPLE).unwrap();
        assert_eq!(directory.plant_id("Margarita").unwrap(), 12);
        assert_eq!(directory.operator("Margarita").unwrap(), "solarview");
        assert_eq!(
            directory.measurement_point("Duqueco").unwrap(),
            "DUQUECO_023_PMGD4_CCS"
        );
        assert_eq!(
            directory.resolve_ids(["Duqueco", " Margarita "]).unwrap(),
            vec![7, 12]
        );
    }

    #[test]
    fn unknown_plant_suggests_closest_name() {
        let directory = PlantDirectory::from_toml_str(SAMPLE).unwrap();
        match directory.plant_id("Margarit").unwrap_err() {
            RevApiError::InvalidPlant { name, suggestion } => {
                assert_eq!(name, "Margarit");
                assert_eq!(suggestion.as_deref(), Some("Margarita"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_operator_is_reported() {
        let directory = PlantDirectory::from_toml_str(SAMPLE).unwrap();
        assert!(directory.operator("Duqueco").is_err());
    }

    #[test]
    fn env_override_wins_for_path() {
        let path = PlantDirectory::default_path(|key| {
            (key == PLANTS_PATH_VAR).then(|| "/srv/rev/plants.toml".to_string())
        });
        assert_eq!(path, PathBuf::from("/srv/rev/plants.toml"));
    }
}
