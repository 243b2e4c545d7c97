//! Reading and writing measurement record files (JSON arrays or header-row CSV).

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MeasurementFileError {
    #[error("data file not found: {0}")]
    NotFound(PathBuf),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} does not contain a list of records")]
    NotAnArray(PathBuf),
    #[error("{path}:{line}: {reason}")]
    Csv {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }

    fn of_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => OutputFormat::Csv,
            _ => OutputFormat::Json,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("unsupported output format '{other}' (expected json or csv)")),
        }
    }
}

fn read_text(path: &Path) -> Result<String, MeasurementFileError> {
    fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            MeasurementFileError::NotFound(path.to_path_buf())
        } else {
            MeasurementFileError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// Read any JSON document, used for single-object payloads such as updates.
pub fn read_json(path: &Path) -> Result<Value, MeasurementFileError> {
    let raw = read_text(path)?;
    serde_json::from_str(&raw).map_err(|source| MeasurementFileError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a flat, ordered list of records from a `.json` or `.csv` file.
pub fn read_records(path: &Path) -> Result<Vec<Value>, MeasurementFileError> {
    match OutputFormat::of_path(path) {
        OutputFormat::Csv => parse_csv(path, &read_text(path)?),
        OutputFormat::Json => match read_json(path)? {
            Value::Array(records) => Ok(records),
            _ => Err(MeasurementFileError::NotAnArray(path.to_path_buf())),
        },
    }
}

fn parse_csv(path: &Path, raw: &str) -> Result<Vec<Value>, MeasurementFileError> {
    let mut rows = csv_rows(path, raw)?.into_iter();
    let Some((_, header)) = rows.next() else {
        return Ok(Vec::new());
    };
    let columns: Vec<String> = header
        .into_iter()
        .map(|field| field.text.trim().to_string())
        .collect();

    rows.map(|(line, fields)| {
        if fields.len() != columns.len() {
            return Err(MeasurementFileError::Csv {
                path: path.to_path_buf(),
                line,
                reason: format!("expected {} fields, found {}", columns.len(), fields.len()),
            });
        }
        let record: Map<String, Value> = columns
            .iter()
            .zip(fields)
            .map(|(column, field)| (column.clone(), field.into_value()))
            .collect();
        Ok(Value::Object(record))
    })
    .collect()
}

#[derive(Debug, Default)]
struct CsvField {
    text: String,
    quoted: bool,
}

impl CsvField {
    /// Quoted fields stay text; bare ones are typed.
    fn into_value(self) -> Value {
        if self.quoted {
            Value::String(self.text)
        } else {
            csv_cell(self.text.trim())
        }
    }

    fn is_blank(&self) -> bool {
        !self.quoted && self.text.trim().is_empty()
    }
}

type CsvRow = (usize, Vec<CsvField>);

/// Split `raw` into rows, each tagged with the line it starts on. Double-quoted
/// fields may span lines and contain commas or doubled quotes. Blank rows are skipped.
fn csv_rows(path: &Path, raw: &str) -> Result<Vec<CsvRow>, MeasurementFileError> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = CsvField::default();
    let mut in_quotes = false;
    let mut line = 1;
    let mut row_line = 1;

    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.text.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.text.push(ch);
                }
                _ => field.text.push(ch),
            }
            continue;
        }
        match ch {
            '"' if !field.quoted && field.text.trim().is_empty() => {
                field = CsvField {
                    text: String::new(),
                    quoted: true,
                };
                in_quotes = true;
            }
            ',' => row.push(std::mem::take(&mut field)),
            '\n' => {
                row.push(std::mem::take(&mut field));
                push_row(&mut rows, row_line, std::mem::take(&mut row));
                line += 1;
                row_line = line;
            }
            '\r' => {}
            _ => field.text.push(ch),
        }
    }
    if in_quotes {
        return Err(MeasurementFileError::Csv {
            path: path.to_path_buf(),
            line: row_line,
            reason: "unterminated quoted field".to_string(),
        });
    }
    row.push(field);
    push_row(&mut rows, row_line, row);
    Ok(rows)
}

fn push_row(rows: &mut Vec<CsvRow>, line: usize, row: Vec<CsvField>) {
    if !row.iter().all(CsvField::is_blank) {
        rows.push((line, row));
    }
}

fn csv_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = cell.parse::<i64>() {
        return Value::Number(int.into());
    }
    cell.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(cell.to_string()))
}

/// Write `records` in `format`; CSV columns follow `columns`.
pub fn write_records(
    path: &Path,
    records: &[Value],
    format: OutputFormat,
    columns: &[&str],
) -> Result<(), MeasurementFileError> {
    let io_err = |source| MeasurementFileError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let encoded = match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(records).map_err(|source| MeasurementFileError::Json {
                path: path.to_path_buf(),
                source,
            })?
        }
        OutputFormat::Csv => encode_csv(records, columns),
    };
    fs::write(path, encoded).map_err(io_err)?;
    info!(path = %path.display(), "Data saved");
    Ok(())
}

/// Quote a cell when it holds a separator, a quote or a line break.
fn csv_escape(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn encode_csv(records: &[Value], columns: &[&str]) -> String {
    let header: Vec<String> = columns.iter().map(|column| csv_escape(column)).collect();
    let mut out = header.join(",");
    out.push('\n');
    for record in records {
        let row: Vec<String> = columns
            .iter()
            .map(|column| match record.get(*column) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(text)) => csv_escape(text),
                Some(other) => csv_escape(&other.to_string()),
            })
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}
