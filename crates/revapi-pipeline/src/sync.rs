//! Daily gen/weather sync: download, impute, upload, clean up.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::NaiveDate;
use revapi_core::measurements::{read_json, read_records};
use revapi_core::{
    IncidentTable, MeasurementFileError, PlantDirectory, RevApiError, RevClient, Transport,
    UploadOutcome,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    Day(NaiveDate),
    Range { start: NaiveDate, end: NaiveDate },
}

impl DateWindow {
    pub fn new(
        date: Option<NaiveDate>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Self, PipelineError> {
        match (date, start, end) {
            (Some(day), None, None) => Ok(DateWindow::Day(day)),
            (None, Some(start), Some(end)) if start <= end => Ok(DateWindow::Range { start, end }),
            (None, Some(start), Some(end)) => Err(PipelineError::Config(format!(
                "start date {start} is after end date {end}"
            ))),
            _ => Err(PipelineError::Config(
                "give either a date or both start and end dates".to_string(),
            )),
        }
    }

    /// Arguments handed to the downloader: `-d <day>` or `<start> <end>`.
    pub fn args(&self) -> Vec<String> {
        match self {
            DateWindow::Day(day) => vec!["-d".to_string(), day.to_string()],
            DateWindow::Range { start, end } => vec![start.to_string(), end.to_string()],
        }
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateWindow::Day(day) => write!(f, "{day}"),
            DateWindow::Range { start, end } => write!(f, "{start}..{end}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub gen_path: PathBuf,
    pub weather_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Imputed {
    pub data: PathBuf,
    pub incidents: PathBuf,
}

/// Pulls raw gen and weather files for one plant from its operator's server.
pub trait MeasurementSource {
    fn download(
        &self,
        operator: &str,
        plant: &str,
        window: &DateWindow,
    ) -> Result<Downloaded, PipelineError>;
}

/// Fills gaps in a raw file and extracts the incidents it implies.
pub trait Imputer {
    fn impute(&self, operator: &str, path: &Path) -> Result<Imputed, PipelineError>;
}

/// Runs `<program> <operator> <window args> -p <plant>`; stdout carries the
/// gen path then the weather path, one per line.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
}

impl CommandSource {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl MeasurementSource for CommandSource {
    fn download(
        &self,
        operator: &str,
        plant: &str,
        window: &DateWindow,
    ) -> Result<Downloaded, PipelineError> {
        let mut args = vec![operator.to_string()];
        args.extend(window.args());
        args.extend(["-p".to_string(), plant.to_string()]);
        let stdout = run_program(&self.program, &args)?;
        let [gen_path, weather_path] = output_paths(&self.program, &stdout)?;
        Ok(Downloaded {
            gen_path,
            weather_path,
        })
    }
}

/// Runs `<program> <operator> <file>`; stdout carries the imputed path then
/// the incidents path.
#[derive(Debug, Clone)]
pub struct CommandImputer {
    program: String,
}

impl CommandImputer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Imputer for CommandImputer {
    fn impute(&self, operator: &str, path: &Path) -> Result<Imputed, PipelineError> {
        let args = [operator.to_string(), path.display().to_string()];
        let stdout = run_program(&self.program, &args)?;
        let [data, incidents] = output_paths(&self.program, &stdout)?;
        Ok(Imputed { data, incidents })
    }
}

fn run_program(program: &str, args: &[String]) -> Result<String, PipelineError> {
    debug!(program, ?args, "Running helper");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|err| PipelineError::Command {
            program: program.to_string(),
            reason: err.to_string(),
        })?;
    if !output.status.success() {
        return Err(PipelineError::Command {
            program: program.to_string(),
            reason: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// The last two non-empty stdout lines, as paths.
fn output_paths(program: &str, stdout: &str) -> Result<[PathBuf; 2], PipelineError> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    match lines.as_slice() {
        [.., first, second] => Ok([PathBuf::from(first), PathBuf::from(second)]),
        _ => Err(PipelineError::CommandOutput {
            program: program.to_string(),
            expected: 2,
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlant {
    pub name: String,
    pub id: u64,
    pub operator: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PlantFiles {
    downloaded: Downloaded,
    generation: Option<Imputed>,
    weather: Option<Imputed>,
}

/// One file's upload; a file that cannot be read is never sent.
#[derive(Debug, Clone, PartialEq)]
pub enum FileUpload<T> {
    Sent(T),
    Unreadable { path: PathBuf, reason: String },
}

impl<T> FileUpload<T> {
    pub fn sent(&self) -> Option<&T> {
        match self {
            FileUpload::Sent(value) => Some(value),
            FileUpload::Unreadable { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlantReport {
    pub plant: String,
    pub generation: FileUpload<UploadOutcome>,
    pub weather: FileUpload<UploadOutcome>,
    pub gen_incidents: FileUpload<Option<Value>>,
    pub weather_incidents: FileUpload<Option<Value>>,
}

impl PlantReport {
    pub fn is_complete(&self) -> bool {
        let uploaded = |outcome: &FileUpload<UploadOutcome>| {
            outcome.sent().is_some_and(UploadOutcome::is_completed)
        };
        let posted = |incidents: &FileUpload<Option<Value>>| {
            incidents.sent().is_some_and(Option::is_some)
        };
        uploaded(&self.generation)
            && uploaded(&self.weather)
            && posted(&self.gen_incidents)
            && posted(&self.weather_incidents)
    }
}

/// Read `path`, then hand its contents to `send`. Read failures are logged
/// and reported; API errors still propagate.
fn upload_file<R, T>(
    plant: &str,
    path: &Path,
    read: impl FnOnce(&Path) -> Result<R, MeasurementFileError>,
    send: impl FnOnce(&R) -> Result<T, RevApiError>,
) -> Result<FileUpload<T>, PipelineError> {
    match read(path) {
        Ok(contents) => Ok(FileUpload::Sent(send(&contents)?)),
        Err(err) => {
            error!(plant, path = %path.display(), "Skipping unreadable file: {err}");
            Ok(FileUpload::Unreadable {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })
        }
    }
}

#[derive(Debug)]
pub struct DataPipeline {
    plants: Vec<SyncPlant>,
    window: DateWindow,
    files: Vec<PlantFiles>,
}

impl DataPipeline {
    /// Resolve ids and operators for every plant; any unknown plant fails here.
    pub fn new(
        directory: &PlantDirectory,
        names: &[String],
        window: DateWindow,
    ) -> Result<Self, PipelineError> {
        let plants = names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(|name| {
                Ok(SyncPlant {
                    name: name.to_string(),
                    id: directory.plant_id(name)?,
                    operator: directory.operator(name)?.to_string(),
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;
        if plants.is_empty() {
            return Err(PipelineError::message("no plants given"));
        }
        Ok(Self {
            plants,
            window,
            files: Vec::new(),
        })
    }

    pub fn plants(&self) -> &[SyncPlant] {
        &self.plants
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }

    pub fn download_data<S: MeasurementSource + ?Sized>(
        &mut self,
        source: &S,
    ) -> Result<(), PipelineError> {
        self.files.clear();
        for plant in &self.plants {
            let downloaded = source.download(&plant.operator, &plant.name, &self.window)?;
            debug!(plant = %plant.name, ?downloaded, "Downloaded");
            self.files.push(PlantFiles {
                downloaded,
                generation: None,
                weather: None,
            });
        }
        info!(window = %self.window, "Data downloaded successfully");
        Ok(())
    }

    pub fn impute_data<I: Imputer + ?Sized>(&mut self, imputer: &I) -> Result<(), PipelineError> {
        if self.files.len() != self.plants.len() {
            return Err(PipelineError::message("impute requested before download"));
        }
        for (plant, files) in self.plants.iter().zip(self.files.iter_mut()) {
            files.generation = Some(imputer.impute(&plant.operator, &files.downloaded.gen_path)?);
            files.weather = Some(imputer.impute(&plant.operator, &files.downloaded.weather_path)?);
        }
        info!("Data imputed successfully");
        Ok(())
    }

    /// Per plant: gen, weather, gen incidents, weather incidents.
    pub fn upload_data<T: Transport>(
        &self,
        client: &RevClient<T>,
    ) -> Result<Vec<PlantReport>, PipelineError> {
        let mut reports = Vec::with_capacity(self.plants.len());
        for (plant, files) in self.plants.iter().zip(&self.files) {
            let (Some(generation), Some(weather)) = (&files.generation, &files.weather) else {
                return Err(PipelineError::message("upload requested before imputation"));
            };
            let name = plant.name.as_str();
            let report = PlantReport {
                plant: plant.name.clone(),
                generation: upload_file(name, &generation.data, read_records, |records| {
                    client.post_gen_measurements(plant.id, records)
                })?,
                weather: upload_file(name, &weather.data, read_records, |records| {
                    client.post_weather_measurements(plant.id, records)
                })?,
                gen_incidents: upload_file(name, &generation.incidents, read_json, |incidents| {
                    client.post_incidents(plant.id, IncidentTable::Gen, incidents)
                })?,
                weather_incidents: upload_file(name, &weather.incidents, read_json, |incidents| {
                    client.post_incidents(plant.id, IncidentTable::Weather, incidents)
                })?,
            };
            if report.is_complete() {
                info!(plant = %plant.name, "Plant synced");
            } else {
                error!(plant = %plant.name, ?report, "Plant sync incomplete");
            }
            reports.push(report);
        }
        info!("Data uploaded successfully");
        Ok(reports)
    }

    /// Download, impute and upload, then remove temporary files unless
    /// `keep_files`. Cleanup also runs when a stage fails.
    pub fn sync<S, I, T>(
        &mut self,
        source: &S,
        imputer: &I,
        client: &RevClient<T>,
        keep_files: bool,
    ) -> Result<Vec<PlantReport>, PipelineError>
    where
        S: MeasurementSource + ?Sized,
        I: Imputer + ?Sized,
        T: Transport,
    {
        let result = self
            .download_data(source)
            .and_then(|()| self.impute_data(imputer))
            .and_then(|()| self.upload_data(client));
        if !keep_files {
            self.clean_up();
        }
        result
    }

    /// Every file produced so far.
    pub fn temporary_files(&self) -> Vec<&Path> {
        let mut paths = Vec::new();
        for files in &self.files {
            paths.push(files.downloaded.gen_path.as_path());
            paths.push(files.downloaded.weather_path.as_path());
            for imputed in [&files.generation, &files.weather].into_iter().flatten() {
                paths.push(imputed.data.as_path());
                paths.push(imputed.incidents.as_path());
            }
        }
        paths
    }

    /// Remove intermediate files. Files already gone are ignored.
    pub fn clean_up(&self) {
        for path in self.temporary_files() {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path.display(), "Could not remove file: {err}"),
            }
        }
        info!("Cleaned up all temporary files");
    }
}
