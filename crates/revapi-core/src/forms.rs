//! Interactive admin forms and query prompts.
//!
//! Every prompt loops until the answer is valid. Input comes through a
//! [`Prompter`] so the same flows run against a terminal or a script.

use std::io;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value, json};

use crate::endpoint::Query;

/// Line-oriented user interaction.
pub trait Prompter {
    fn ask(&mut self, label: &str) -> io::Result<String>;
    fn ask_secret(&mut self, label: &str) -> io::Result<String>;
    fn notify(&mut self, message: &str);
}

pub fn is_valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .map(|pattern| pattern.is_match(email))
        .unwrap_or(false)
}

pub fn is_numeric_id(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

/// ASCII identifier derived from a display name: accents stripped, spaces to `_`.
pub fn safe_name(name: &str) -> String {
    name.chars()
        .filter_map(|c| {
            if c == ' ' {
                return Some('_');
            }
            let folded = fold_accent(c);
            (folded.is_ascii_alphanumeric() || folded == '_').then_some(folded)
        })
        .collect()
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
        'Á' | 'À' | 'Ä' | 'Â' | 'Ã' => 'A',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'É' | 'È' | 'Ë' | 'Ê' => 'E',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' => 'O',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ç' => 'c',
        'Ç' => 'C',
        other => other,
    }
}

/// Validate a query value before it is sent; dates must be `YYYY-MM-DD`.
pub fn validate_query_value(param: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{param} cannot be empty"));
    }
    if matches!(param, "date" | "start_date" | "end_date")
        && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err()
    {
        return Err(format!("{param} must be a date formatted as YYYY-MM-DD"));
    }
    Ok(())
}

fn ask_until<P, F>(prompter: &mut P, label: &str, mut check: F) -> io::Result<String>
where
    P: Prompter + ?Sized,
    F: FnMut(&str) -> Result<(), String>,
{
    loop {
        let answer = prompter.ask(label)?.trim().to_string();
        match check(&answer) {
            Ok(()) => return Ok(answer),
            Err(message) => prompter.notify(&message),
        }
    }
}

fn ask_number<P, T>(prompter: &mut P, label: &str, what: &str) -> io::Result<T>
where
    P: Prompter + ?Sized,
    T: std::str::FromStr,
{
    loop {
        let answer = prompter.ask(label)?;
        match answer.trim().parse::<T>() {
            Ok(value) if !answer.trim().is_empty() => return Ok(value),
            _ => prompter.notify(&format!("Invalid {what}")),
        }
    }
}

fn non_empty(what: &'static str) -> impl FnMut(&str) -> Result<(), String> {
    move |value: &str| {
        if value.is_empty() {
            Err(format!("{what} cannot be empty"))
        } else {
            Ok(())
        }
    }
}

/// Prompt for every parameter in `params`, in order.
pub fn prompt_query<P: Prompter + ?Sized>(prompter: &mut P, params: &[&str]) -> io::Result<Query> {
    let mut query = Query::new();
    for param in params {
        let value = ask_until(prompter, &format!("Enter {param}: "), |value| {
            validate_query_value(param, value)
        })?;
        query.push(*param, value);
    }
    Ok(query)
}

/// Prompt for a numeric id of `kind` ("plant", "portfolio", ...).
pub fn prompt_id<P: Prompter + ?Sized>(prompter: &mut P, kind: &str) -> io::Result<u64> {
    ask_number(prompter, &format!("Enter {kind} id: "), &format!("{kind} id"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub portfolios: Vec<u64>,
}

impl ProfileForm {
    pub fn prompt<P: Prompter + ?Sized>(prompter: &mut P) -> io::Result<Self> {
        let username = ask_until(prompter, "Enter username: ", non_empty("Username"))?;
        let email = ask_until(prompter, "Enter email: ", |value| {
            if is_valid_email(value) {
                Ok(())
            } else {
                Err("Invalid email".to_string())
            }
        })?;
        let password = loop {
            let password = prompter.ask_secret("Enter password: ")?.trim().to_string();
            let confirm = prompter.ask_secret("Confirm password: ")?.trim().to_string();
            if password.is_empty() {
                prompter.notify("Password cannot be empty");
            } else if password != confirm {
                prompter.notify("Passwords do not match");
            } else {
                break password;
            }
        };
        let portfolios = loop {
            let raw = prompter.ask("Enter portfolios (comma separated, blank allowed): ")?;
            match parse_id_list(&raw) {
                Ok(ids) => break ids,
                Err(bad) => prompter.notify(&format!("Invalid portfolio id '{bad}'")),
            }
        };
        Ok(Self {
            username,
            email,
            password,
            portfolios,
        })
    }

    /// Body expected by the profile endpoints; `id` is set for updates.
    pub fn to_json(&self, id: Option<u64>) -> Value {
        let mut body = Map::new();
        body.insert(
            "user".to_string(),
            json!({
                "username": self.username,
                "email": self.email,
                "password": self.password,
            }),
        );
        if !self.portfolios.is_empty() {
            body.insert("portfolios".to_string(), json!(self.portfolios));
        }
        if let Some(id) = id {
            body.insert("id".to_string(), json!(id));
        }
        Value::Object(body)
    }
}

fn parse_id_list(raw: &str) -> Result<Vec<u64>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u64>().map_err(|_| part.to_string()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortfolioForm {
    pub name: String,
    pub country: String,
}

impl PortfolioForm {
    pub fn prompt<P: Prompter + ?Sized>(prompter: &mut P) -> io::Result<Self> {
        let name = ask_until(prompter, "Enter portfolio name: ", |value| {
            if value.is_empty() || value.contains(' ') {
                Err("Portfolio name cannot be empty or contain spaces.".to_string())
            } else {
                Ok(())
            }
        })?;
        let country = ask_until(prompter, "Enter country: ", non_empty("Country"))?;
        Ok(Self { name, country })
    }

    pub fn to_json(&self, id: Option<u64>) -> Value {
        let mut body = json!({"name": self.name, "country": self.country});
        if let (Some(id), Value::Object(map)) = (id, &mut body) {
            map.insert("id".to_string(), json!(id));
        }
        body
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlantForm {
    pub plant_id: u64,
    pub name: String,
    pub portfolio: u64,
    pub inv_num: u64,
    pub poa_criteria: f64,
    pub coef_temp: f64,
    pub peak_power: f64,
    pub time_interval: f64,
    pub cts_config: Option<String>,
    pub temperature_reference: Option<String>,
    pub budget: Option<String>,
    pub peak_power_per_inverter: Option<String>,
    pub tz: Option<String>,
    pub operator: Option<String>,
}

impl PlantForm {
    pub fn prompt<P: Prompter + ?Sized>(prompter: &mut P) -> io::Result<Self> {
        let plant_id = ask_number(prompter, "Enter plant id: ", "plant id")?;
        let name = ask_until(prompter, "Enter plant name: ", non_empty("Plant name"))?;
        let portfolio = ask_number(prompter, "Enter portfolio id: ", "portfolio id")?;
        let inv_num = ask_number(prompter, "Enter inverter number: ", "inverter number")?;
        let poa_criteria = ask_number(prompter, "Enter POA criteria: ", "POA criteria")?;
        let coef_temp = ask_number(
            prompter,
            "Enter temperature coefficient: ",
            "temperature coefficient",
        )?;
        let peak_power = ask_number(prompter, "Enter peak power: ", "peak power")?;
        let cts_config = optional(prompter.ask("Enter CTS configuration: ")?);
        let time_interval = ask_number(prompter, "Enter time interval: ", "time interval")?;
        let temperature_reference = optional(prompter.ask("Enter temperature reference: ")?);
        let budget = optional(prompter.ask("Enter budget: ")?);
        let peak_power_per_inverter = optional(prompter.ask("Enter peak power per inverter: ")?);
        let tz = optional(prompter.ask("Enter timezone: ")?);
        let operator = optional(prompter.ask("Enter operator: ")?);
        Ok(Self {
            plant_id,
            name,
            portfolio,
            inv_num,
            poa_criteria,
            coef_temp,
            peak_power,
            time_interval,
            cts_config,
            temperature_reference,
            budget,
            peak_power_per_inverter,
            tz,
            operator,
        })
    }

    /// Blank optional answers are omitted from the body entirely.
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert("plant_id".to_string(), json!(self.plant_id));
        body.insert("name".to_string(), json!(self.name));
        body.insert("safe_name".to_string(), json!(safe_name(&self.name)));
        body.insert("portfolio".to_string(), json!(self.portfolio));
        body.insert("inv_num".to_string(), json!(self.inv_num));
        body.insert("poa_criteria".to_string(), json!(self.poa_criteria));
        body.insert("coef_temp".to_string(), json!(self.coef_temp));
        body.insert("peak_power".to_string(), json!(self.peak_power));
        body.insert("time_interval".to_string(), json!(self.time_interval));
        let optional_fields = [
            ("cts_config", &self.cts_config),
            ("temperature_reference", &self.temperature_reference),
            ("budget", &self.budget),
            ("peak_power_per_inverter", &self.peak_power_per_inverter),
            ("operator", &self.operator),
            ("tz", &self.tz),
        ];
        for (key, value) in optional_fields {
            if let Some(value) = value {
                body.insert(key.to_string(), json!(value));
            }
        }
        Value::Object(body)
    }
}

fn optional(answer: String) -> Option<String> {
    let trimmed = answer.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
