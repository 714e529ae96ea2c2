//! JSON Codec Module
//!
//! Reads and writes frames as JSON in records orientation, i.e. an array of
//! objects. Column order is the order of first appearance across records.
//! Integer columns are promoted to float when any record carries a float.

use std::collections::HashMap;
use std::io;

use serde_json::Value as Json;

use super::column::{Column, Value};
use super::{Frame, FrameError};

// == Reader Options ==
#[derive(Debug, Clone, Default)]
pub struct JsonOptions {
    /// Enum columns and their ordered categories.
    pub enum_values: HashMap<String, Vec<String>>,
}

// == Read ==
pub fn read_json(data: &[u8], opts: &JsonOptions) -> Result<Frame, FrameError> {
    let records: Vec<serde_json::Map<String, Json>> = serde_json::from_slice(data)
        .map_err(|e| FrameError::Decode(format!("could not decode JSON records: {e}")))?;

    // Column order is the order of first appearance.
    let mut names: Vec<String> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }

    let null = Json::Null;
    let mut columns = Vec::with_capacity(names.len());
    for name in &names {
        let cells: Vec<&Json> = records
            .iter()
            .map(|r| r.get(name).unwrap_or(&null))
            .collect();
        let column = if let Some(categories) = opts.enum_values.get(name) {
            parse_enum(name, &cells, categories)?
        } else {
            parse_inferred(name, &cells)?
        };
        columns.push((name.clone(), column));
    }

    Frame::new(columns)
}

fn parse_inferred(name: &str, cells: &[&Json]) -> Result<Column, FrameError> {
    #[derive(PartialEq, Clone, Copy)]
    enum Kind {
        Unknown,
        Int,
        Float,
        Bool,
        Str,
    }

    let mut kind = Kind::Unknown;
    for cell in cells {
        let observed = match cell {
            Json::Null => continue,
            Json::Number(n) if n.is_i64() => Kind::Int,
            Json::Number(_) => Kind::Float,
            Json::Bool(_) => Kind::Bool,
            Json::String(_) => Kind::Str,
            other => {
                return Err(FrameError::Decode(format!(
                    "unsupported JSON value {other} in column {name}"
                )))
            }
        };

        kind = match (kind, observed) {
            (Kind::Unknown, k) => k,
            (k, o) if k == o => k,
            (Kind::Int, Kind::Float) | (Kind::Float, Kind::Int) => Kind::Float,
            _ => {
                return Err(FrameError::Decode(format!(
                    "mixed value types in column {name}"
                )))
            }
        };
    }

    match kind {
        Kind::Int => Ok(Column::Int(
            cells.iter().map(|c| c.as_i64()).collect(),
        )),
        Kind::Float => Ok(Column::Float(
            cells.iter().map(|c| c.as_f64()).collect(),
        )),
        Kind::Bool => Ok(Column::Bool(
            cells.iter().map(|c| c.as_bool()).collect(),
        )),
        // All-null columns default to string
        Kind::Str | Kind::Unknown => Ok(Column::Str(
            cells
                .iter()
                .map(|c| c.as_str().map(str::to_string))
                .collect(),
        )),
    }
}

fn parse_enum(name: &str, cells: &[&Json], categories: &[String]) -> Result<Column, FrameError> {
    let mut codes = Vec::with_capacity(cells.len());
    for cell in cells {
        match cell {
            Json::Null => codes.push(None),
            Json::String(s) => match categories.iter().position(|c| c == s) {
                Some(code) => codes.push(Some(code as u32)),
                None => {
                    return Err(FrameError::Decode(format!(
                        "unknown enum value '{s}' in column {name}"
                    )))
                }
            },
            other => {
                return Err(FrameError::Decode(format!(
                    "enum column {name} requires string values, was: {other}"
                )))
            }
        }
    }

    Ok(Column::Enum {
        codes,
        categories: categories.to_vec(),
    })
}

// == Write ==
pub fn write_json<W: io::Write>(frame: &Frame, writer: W) -> Result<(), FrameError> {
    let mut records = Vec::with_capacity(frame.len());
    for row in 0..frame.len() {
        let mut record = serde_json::Map::new();
        for (name, col) in frame.columns() {
            record.insert(name.to_string(), cell_to_json(&col.value(row)));
        }
        records.push(Json::Object(record));
    }

    serde_json::to_writer(writer, &records)
        .map_err(|e| FrameError::Decode(format!("could not encode JSON records: {e}")))
}

fn cell_to_json(value: &Value) -> Json {
    match value {
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Bool(b) => Json::from(*b),
        Value::Str(s) => Json::from(s.clone()),
        Value::Null => Json::Null,
    }
}
