use std::path::{Path, PathBuf};

use revapi_core::measurements::read_records;
use revapi_core::{OutputFormat, PlantDirectory, RevClient, Transport, UploadOutcome};
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::fetch::PrmtConsumer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrmtPlant {
    pub name: String,
    pub id: u64,
    pub measurement_point: String,
}

/// Monthly PRMT job: every plant resolved before any download starts.
#[derive(Debug)]
pub struct PrmtPipeline {
    plants: Vec<PrmtPlant>,
    period: String,
    downloaded: Vec<Option<PathBuf>>,
}

impl PrmtPipeline {
    pub fn new(
        directory: &PlantDirectory,
        names: &[String],
        period: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let plants = names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(|name| {
                Ok(PrmtPlant {
                    name: name.to_string(),
                    id: directory.plant_id(name)?,
                    measurement_point: directory.measurement_point(name)?.to_string(),
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;
        if plants.is_empty() {
            return Err(PipelineError::message("no plants given"));
        }
        Ok(Self {
            plants,
            period: period.into(),
            downloaded: Vec::new(),
        })
    }

    pub fn plants(&self) -> &[PrmtPlant] {
        &self.plants
    }

    pub fn period(&self) -> &str {
        &self.period
    }

    /// One entry per plant; `None` where the download failed.
    pub fn downloaded(&self) -> &[Option<PathBuf>] {
        &self.downloaded
    }

    /// Download every plant. A failing plant is logged and skipped.
    pub fn download<T: Transport>(
        &mut self,
        consumer: &PrmtConsumer<T>,
        format: OutputFormat,
        output_dir: &Path,
    ) -> &[Option<PathBuf>] {
        self.downloaded = self
            .plants
            .iter()
            .map(|plant| {
                match consumer.download(
                    &plant.name,
                    &plant.measurement_point,
                    &self.period,
                    format,
                    output_dir,
                ) {
                    Ok(path) => Some(path),
                    Err(err) => {
                        error!(
                            plant = %plant.name,
                            period = %self.period,
                            "PRMT download failed: {err}"
                        );
                        None
                    }
                }
            })
            .collect();
        &self.downloaded
    }

    /// Upload each downloaded file; needs an admin client.
    pub fn upload<T: Transport>(
        &self,
        client: &RevClient<T>,
    ) -> Result<Vec<(String, UploadOutcome)>, PipelineError> {
        let mut outcomes = Vec::new();
        for (plant, path) in self.plants.iter().zip(&self.downloaded) {
            let Some(path) = path else {
                warn!(plant = %plant.name, "Nothing downloaded, skipping upload");
                continue;
            };
            let records = read_records(path)?;
            let outcome = client.post_prmt_measurements(plant.id, &records)?;
            if outcome.is_completed() {
                info!(plant = %plant.name, "Uploaded data");
            } else {
                error!(plant = %plant.name, outcome = ?outcome, "Upload failed");
            }
            outcomes.push((plant.name.clone(), outcome));
        }
        Ok(outcomes)
    }
}
