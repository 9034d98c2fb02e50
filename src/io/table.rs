//! Raw tabular input (CSV or JSON records).
//!
//! This module only turns bytes into a header list plus string cells. It does
//! no numeric work: coercion lives in `data::coerce`.
//!
//! Header names are kept verbatim (no trimming, no case folding) because
//! required columns are matched by exact name. The only normalization is
//! stripping a UTF-8 BOM from the first header, which spreadsheet exports
//! commonly prepend.

use std::io::Read;
use std::path::Path;

use serde_json::Value;

use crate::domain::InputFormat;
use crate::error::AppError;

/// Header row plus string cells, one `Vec` per data row.
///
/// Rows are padded to the header width; missing cells are empty strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, String::new());
                r
            })
            .collect();
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first header named exactly `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Required names that are absent, in the order they were requested.
    pub fn missing_columns(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.column_index(name).is_none())
            .cloned()
            .collect()
    }

    /// Fail with `MissingColumns` unless every required name is present.
    pub fn require_columns(&self, required: &[String]) -> Result<(), AppError> {
        let missing = self.missing_columns(required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::missing_columns(missing))
        }
    }

    /// Cells of a column, or `None` if the column is absent.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }
}

/// Parse bytes in the given format.
pub fn parse_table(bytes: &[u8], format: InputFormat) -> Result<RawTable, AppError> {
    match format {
        InputFormat::Csv => parse_csv(bytes),
        InputFormat::Json => parse_json(bytes),
    }
}

/// Read a table from a path (`-` reads stdin). Format defaults to the file extension.
pub fn read_table(path: &Path, format: Option<InputFormat>) -> Result<RawTable, AppError> {
    let format = format.unwrap_or_else(|| InputFormat::from_path(path));
    let bytes = if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|e| AppError::UnreadableInput(format!("failed to read stdin: {e}")))?;
        buf
    } else {
        std::fs::read(path).map_err(|e| {
            AppError::UnreadableInput(format!("failed to open '{}': {e}", path.display()))
        })?
    };
    parse_table(&bytes, format)
}

pub fn parse_csv(bytes: &[u8]) -> Result<RawTable, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::UnreadableInput(format!("failed to read CSV headers: {e}")))?
        .iter()
        .enumerate()
        .map(|(idx, h)| normalize_header_name(idx, h))
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(AppError::UnreadableInput("CSV has no header row".to_string()));
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        // +2: 1-based, and the header occupies line 1.
        let record = record
            .map_err(|e| AppError::UnreadableInput(format!("CSV parse error near line {}: {e}", idx + 2)))?;
        if record.iter().all(|c| c.is_empty()) {
            continue;
        }
        if record.len() > headers.len() {
            return Err(AppError::UnreadableInput(format!(
                "line {} has {} fields but the header has {}",
                idx + 2,
                record.len(),
                headers.len()
            )));
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable::new(headers, rows))
}

fn normalize_header_name(idx: usize, name: &str) -> String {
    if idx == 0 {
        name.trim_start_matches('\u{feff}').to_string()
    } else {
        name.to_string()
    }
}

/// Parse an array of JSON records, or a single record.
pub fn parse_json(bytes: &[u8]) -> Result<RawTable, AppError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| AppError::UnreadableInput(format!("invalid JSON: {e}")))?;

    let records = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        other => {
            return Err(AppError::UnreadableInput(format!(
                "expected a JSON object or array of objects, got {}",
                json_type_name(&other)
            )));
        }
    };

    let mut headers: Vec<String> = Vec::new();
    let mut objects = Vec::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        let Value::Object(map) = record else {
            return Err(AppError::UnreadableInput(format!(
                "record {} is not a JSON object",
                idx + 1
            )));
        };
        for key in map.keys() {
            if !headers.iter().any(|h| h == key) {
                headers.push(key.clone());
            }
        }
        objects.push(map);
    }

    let rows = objects
        .iter()
        .map(|map| {
            headers
                .iter()
                .map(|h| map.get(h).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();

    Ok(RawTable::new(headers, rows))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => u8::from(*b).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
