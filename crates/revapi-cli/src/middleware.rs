//! Collects whatever an operation still needs (ids, files, queries, forms) and runs it.

use std::path::PathBuf;

use revapi_core::endpoint::Query;
use revapi_core::forms::{PlantForm, PortfolioForm, ProfileForm, Prompter, prompt_id, prompt_query};
use revapi_core::measurements::{read_json, read_records};
use revapi_core::{
    FormKind, IdKind, IncidentTable, Operation, OperationShape, RevApiError, RevClient,
    TaskOutcome, Transport, UploadOutcome,
};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::prompt::select_data_file;

/// Values supplied on the command line; anything missing is prompted for.
#[derive(Debug, Clone, Default)]
pub struct InvocationOptions {
    pub detailed: bool,
    pub range: bool,
    pub file: Option<PathBuf>,
    pub id: Option<u64>,
    pub query: Option<Query>,
    pub table: Option<IncidentTable>,
}

pub struct Middleware<'a, T, P: ?Sized> {
    client: &'a RevClient<T>,
    prompter: &'a mut P,
    options: InvocationOptions,
}

impl<'a, T: Transport, P: Prompter + ?Sized> Middleware<'a, T, P> {
    pub fn new(client: &'a RevClient<T>, prompter: &'a mut P, options: InvocationOptions) -> Self {
        Self {
            client,
            prompter,
            options,
        }
    }

    /// Run `operation`. Only connection failures are returned; every other
    /// failure is logged and the invocation still counts as handled.
    pub fn run(&mut self, operation: Operation) -> Result<(), RevApiError> {
        match self.dispatch(operation) {
            Err(err) if !err.is_connection() => {
                error!("Operation {} failed: {err}", operation.as_str().to_uppercase());
                Ok(())
            }
            other => other,
        }
    }

    fn dispatch(&mut self, operation: Operation) -> Result<(), RevApiError> {
        match operation.shape() {
            OperationShape::Form { kind, update } => self.form(operation, kind, update),
            OperationShape::NoArgument => {
                let detailed = self.options.detailed;
                let response = match operation {
                    Operation::GetUserPlantsAccess => self.client.get_user_plants_access()?,
                    Operation::GetUserPortfoliosAccess => {
                        self.client.get_user_portfolios_access(detailed)?
                    }
                    Operation::ProfileList => self.client.profile_list()?,
                    Operation::UserList => self.client.user_list()?,
                    Operation::PortfolioList => self.client.portfolio_list()?,
                    Operation::ListPlants => self.client.list_plants(detailed)?,
                    other => unreachable!("{other} is not a no-argument operation"),
                };
                report(operation, response);
                Ok(())
            }
            OperationShape::ById(kind) => {
                let id = self.id(kind)?;
                let response = match operation {
                    Operation::PlantDetail => self.client.plant_detail(id)?,
                    Operation::PortfolioDetail => self.client.portfolio_detail(id)?,
                    Operation::GetPortfolioPlants => {
                        self.client.get_portfolio_plants(id, self.options.detailed)?
                    }
                    other => unreachable!("{other} is not an id operation"),
                };
                report(operation, response);
                Ok(())
            }
            OperationShape::ByIdWithData(kind) => {
                let id = self.id(kind)?;
                let Some(path) = self.data_file()? else {
                    return Ok(());
                };
                match operation {
                    Operation::PostGenMeasurements => {
                        let records = read_records(&path)?;
                        report_upload(operation, self.client.post_gen_measurements(id, &records)?);
                    }
                    Operation::PostWeatherMeasurements => {
                        let records = read_records(&path)?;
                        report_upload(
                            operation,
                            self.client.post_weather_measurements(id, &records)?,
                        );
                    }
                    Operation::PostPrmtMeasurements => {
                        let records = read_records(&path)?;
                        report_upload(operation, self.client.post_prmt_measurements(id, &records)?);
                    }
                    Operation::UpdateGenMeasurements => {
                        let data = read_json(&path)?;
                        report(operation, self.client.update_gen_measurements(id, &data)?);
                    }
                    Operation::UpdateWeatherMeasurements => {
                        let data = read_json(&path)?;
                        report(operation, self.client.update_weather_measurements(id, &data)?);
                    }
                    other => unreachable!("{other} does not upload data"),
                }
                Ok(())
            }
            OperationShape::ByIdWithQuery => {
                let plant = self.id(IdKind::Plant)?;
                let query = self.query(operation)?;
                let response = match operation {
                    Operation::GetGenMeasurements => {
                        self.client.get_gen_measurements(plant, &query)?
                    }
                    Operation::GetWeatherMeasurements => {
                        self.client.get_weather_measurements(plant, &query)?
                    }
                    Operation::GetIncidents => self.client.get_incidents(plant, &query)?,
                    Operation::GetHper => self.client.get_hper(plant, &query)?,
                    Operation::GetDailyAvailability => {
                        self.client.get_daily_availability(plant, &query)?
                    }
                    Operation::GetDailyMetrics => self.client.get_daily_metrics(plant, &query)?,
                    other => unreachable!("{other} is not a query operation"),
                };
                report(operation, response);
                Ok(())
            }
            OperationShape::Incidents => {
                let plant = self.id(IdKind::Plant)?;
                let Some(path) = self.data_file()? else {
                    return Ok(());
                };
                let data = read_json(&path)?;
                let table = self.table()?;
                match self.client.post_incidents(plant, table, &data)? {
                    Some(body) => {
                        info!("Incident posted successfully");
                        debug!("{}", pretty(&body));
                    }
                    None => error!("Incident post failed"),
                }
                Ok(())
            }
            OperationShape::Task(kind) => {
                let plant = self.id(IdKind::Plant)?;
                let query = self.query(operation)?;
                let outcome = self.client.run_task(kind, plant, &query)?;
                if matches!(outcome, TaskOutcome::Succeeded { .. }) {
                    info!("Successful operation {}", operation.as_str().to_uppercase());
                }
                outcome.log();
                Ok(())
            }
        }
    }

    fn form(
        &mut self,
        operation: Operation,
        kind: FormKind,
        update: bool,
    ) -> Result<(), RevApiError> {
        let (label, response) = match (kind, update) {
            (FormKind::Profile, false) => {
                let form = ProfileForm::prompt(self.prompter)?;
                ("Profile created", self.client.create_profile(&form.to_json(None))?)
            }
            (FormKind::Profile, true) => {
                let id = self.id(IdKind::Profile)?;
                let form = ProfileForm::prompt(self.prompter)?;
                (
                    "Profile updated",
                    self.client.update_profile(id, &form.to_json(Some(id)))?,
                )
            }
            (FormKind::Portfolio, false) => {
                let form = PortfolioForm::prompt(self.prompter)?;
                (
                    "Portfolio created",
                    self.client.create_portfolio(&form.to_json(None))?,
                )
            }
            (FormKind::Portfolio, true) => {
                let id = self.id(IdKind::Portfolio)?;
                let form = PortfolioForm::prompt(self.prompter)?;
                (
                    "Portfolio updated",
                    self.client.update_portfolio(id, &form.to_json(Some(id)))?,
                )
            }
            (FormKind::Plant, false) => {
                let form = PlantForm::prompt(self.prompter)?;
                ("Plant created", self.client.create_plant(&form.to_json())?)
            }
            (FormKind::Plant, true) => {
                let form = PlantForm::prompt(self.prompter)?;
                (
                    "Plant updated",
                    self.client.update_plant(form.plant_id, &form.to_json())?,
                )
            }
        };
        match response {
            Some(body) => {
                info!("{label} successfully");
                debug!("{}", pretty(&body));
            }
            None => error!("Operation {} failed", operation.as_str().to_uppercase()),
        }
        Ok(())
    }

    fn id(&mut self, kind: IdKind) -> Result<u64, RevApiError> {
        if let Some(id) = self.options.id {
            return Ok(id);
        }
        Ok(prompt_id(self.prompter, kind.as_str())?)
    }

    fn query(&mut self, operation: Operation) -> Result<Query, RevApiError> {
        if let Some(query) = &self.options.query {
            return Ok(query.clone());
        }
        let params = operation.query_params(self.options.range);
        Ok(prompt_query(self.prompter, &params)?)
    }

    fn data_file(&mut self) -> Result<Option<PathBuf>, RevApiError> {
        if let Some(path) = &self.options.file {
            return Ok(Some(path.clone()));
        }
        let selected = select_data_file(self.prompter)?;
        if let Some(path) = &selected {
            self.options.file = Some(path.clone());
        }
        Ok(selected)
    }

    fn table(&mut self) -> Result<IncidentTable, RevApiError> {
        if let Some(table) = self.options.table {
            return Ok(table);
        }
        loop {
            let answer = self.prompter.ask("Enter table: ")?;
            match IncidentTable::parse(&answer) {
                Some(table) => return Ok(table),
                None => self.prompter.notify("Invalid table"),
            }
        }
    }
}

fn pretty(body: &Value) -> String {
    serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string())
}

fn report(operation: Operation, response: Option<Value>) {
    match response {
        Some(body) => {
            info!("Successful operation {}", operation.as_str().to_uppercase());
            debug!("{}", pretty(&body));
        }
        None => error!("Operation {} failed", operation.as_str().to_uppercase()),
    }
}

fn report_upload(operation: Operation, outcome: UploadOutcome) {
    match outcome {
        UploadOutcome::Completed { chunks } => info!(
            chunks,
            "Successful operation {}",
            operation.as_str().to_uppercase()
        ),
        other => error!(outcome = ?other, "Operation {} failed", operation.as_str().to_uppercase()),
    }
}
