//! Request Header Parsing
//!
//! The X-QCache-* headers carry per-column type overrides, enum
//! declarations, stand-in column values and a CSV row-count hint. Key-value
//! headers accept either a `k=v;k2=v2` list or a JSON object.

use std::collections::HashMap;

use axum::http::HeaderMap;
use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::frame::{CsvOptions, JsonOptions};

pub const TYPES_HEADER: &str = "x-qcache-types";
pub const ENUM_SPECS_HEADER: &str = "x-qcache-enum-specs";
pub const STAND_IN_HEADER: &str = "x-qcache-stand-in-columns";
pub const ROW_COUNT_HINT_HEADER: &str = "x-qcache-row-count-hint";
pub const UNSLICED_LENGTH_HEADER: &str = "x-qcache-unsliced-length";

// == Header Value ==
/// A parsed value from a key-value header. Numeric strings are coerced.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Int(i64),
    Float(f64),
    Str(String),
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    match headers.get(name) {
        Some(value) => value
            .to_str()
            .map(str::trim)
            .map_err(|_| Error::bad_request(format!("header {name} is not valid UTF-8"))),
        None => Ok(""),
    }
}

/// Parses a key-value header. Pair order is preserved.
pub fn key_values(headers: &HeaderMap, name: &str) -> Result<Vec<(String, HeaderValue)>> {
    let raw = header_str(headers, name)?;
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    if raw.starts_with('{') {
        // JSON object form
        let object: serde_json::Map<String, Json> = serde_json::from_str(raw).map_err(|e| {
            Error::bad_request(format!(
                "could not JSON decode content in header {name}: {raw}. {e}"
            ))
        })?;

        return object
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Json::String(s) => HeaderValue::Str(s),
                    Json::Number(n) => {
                        if let Some(i) = n.as_i64() {
                            HeaderValue::Int(i)
                        } else if let Some(f) = n.as_f64() {
                            HeaderValue::Float(f)
                        } else {
                            return Err(Error::bad_request(format!(
                                "unrepresentable number in header {name}: {n}"
                            )));
                        }
                    }
                    other => {
                        return Err(Error::bad_request(format!(
                            "invalid value in header {name}: {other}"
                        )))
                    }
                };
                Ok((key, value))
            })
            .collect();
    }

    // Key-val format: key=val;key2=val2;...
    let mut result = Vec::new();
    for pair in raw.split(';') {
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, '=');
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            return Err(Error::bad_request(format!(
                "invalid key=value pair in header {name}: {pair}"
            )));
        };

        let value = value.trim();
        let value = if let Ok(i) = value.parse::<i64>() {
            HeaderValue::Int(i)
        } else if let Ok(f) = value.parse::<f64>() {
            HeaderValue::Float(f)
        } else {
            HeaderValue::Str(value.to_string())
        };
        result.push((key.trim().to_string(), value));
    }

    Ok(result)
}

/// Key-value header where every value must be a string.
fn string_values(headers: &HeaderMap, name: &str) -> Result<Vec<(String, String)>> {
    key_values(headers, name)?
        .into_iter()
        .map(|(key, value)| match value {
            HeaderValue::Str(s) => Ok((key, s)),
            other => Err(Error::bad_request(format!(
                "{other:?} is not a valid string in header {name}"
            ))),
        })
        .collect()
}

/// `X-QCache-enum-specs`: JSON `{column: [ordered categories]}`.
pub fn enum_specs(headers: &HeaderMap) -> Result<HashMap<String, Vec<String>>> {
    let raw = header_str(headers, ENUM_SPECS_HEADER)?;
    if raw.is_empty() {
        return Ok(HashMap::new());
    }

    serde_json::from_str(raw).map_err(|e| {
        Error::bad_request(format!(
            "could not decode JSON content in {ENUM_SPECS_HEADER}: {e}"
        ))
    })
}

fn row_count_hint(headers: &HeaderMap) -> Result<usize> {
    let raw = header_str(headers, ROW_COUNT_HINT_HEADER)?;
    if raw.is_empty() {
        return Ok(0);
    }

    raw.parse().map_err(|_| {
        Error::bad_request(format!("invalid {ROW_COUNT_HINT_HEADER}: {raw}"))
    })
}

/// Assembles the CSV reader options from the request headers.
pub fn csv_options(headers: &HeaderMap) -> Result<CsvOptions> {
    let mut types = HashMap::new();
    for (column, name) in string_values(headers, TYPES_HEADER)? {
        types.insert(column, name.parse().map_err(|e| Error::bad_request(format!("{e}")))?);
    }

    Ok(CsvOptions {
        types,
        enum_values: enum_specs(headers)?,
        empty_null: true,
        row_count_hint: row_count_hint(headers)?,
    })
}

/// Assembles the JSON reader options from the request headers.
pub fn json_options(headers: &HeaderMap) -> Result<JsonOptions> {
    Ok(JsonOptions {
        enum_values: enum_specs(headers)?,
    })
}

/// Splits a Content-Type value into media type and charset.
pub fn parse_content_type(value: &str) -> (String, String) {
    let mut parts = value.split(';');
    let media_type = parts.next().unwrap_or("").trim().to_string();

    let charset = parts
        .filter_map(|p| p.trim().strip_prefix("charset="))
        .next()
        .unwrap_or("")
        .trim()
        .to_string();

    (media_type, charset)
}
