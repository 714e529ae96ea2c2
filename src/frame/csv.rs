//! CSV Codec Module
//!
//! Reads and writes frames in CSV. Column types are inferred from the data
//! unless overridden per column; empty cells become nulls; enum columns are
//! declared up front with their category order.

use std::collections::HashMap;
use std::io;

use super::column::{Column, ColumnType, Value};
use super::{Frame, FrameError};

// == Reader Options ==
#[derive(Debug, Clone, Default)]
pub struct CsvOptions {
    /// Per-column type overrides.
    pub types: HashMap<String, ColumnType>,
    /// Enum columns and their ordered categories.
    pub enum_values: HashMap<String, Vec<String>>,
    /// Treat empty cells as null.
    pub empty_null: bool,
    /// Pre-allocation hint for the row vectors.
    pub row_count_hint: usize,
}

// == Read ==
pub fn read_csv(data: &[u8], opts: &CsvOptions) -> Result<Frame, FrameError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| FrameError::Decode(format!("could not read CSV header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows: Vec<csv::StringRecord> = Vec::with_capacity(opts.row_count_hint);
    for record in reader.records() {
        let record = record.map_err(|e| FrameError::Decode(format!("could not read CSV row: {e}")))?;
        if record.len() != headers.len() {
            return Err(FrameError::Decode(format!(
                "CSV row has {} fields, expected {}",
                record.len(),
                headers.len()
            )));
        }
        rows.push(record);
    }

    let mut columns = Vec::with_capacity(headers.len());
    for (idx, name) in headers.iter().enumerate() {
        let cells: Vec<&str> = rows.iter().map(|r| &r[idx]).collect();
        let column = if let Some(categories) = opts.enum_values.get(name) {
            parse_enum(name, &cells, categories, opts.empty_null)?
        } else {
            let typ = match opts.types.get(name) {
                Some(typ) => *typ,
                None => infer_type(&cells, opts.empty_null),
            };
            parse_typed(name, &cells, typ, opts.empty_null)?
        };
        columns.push((name.clone(), column));
    }

    Frame::new(columns)
}

fn is_null_cell(cell: &str, empty_null: bool) -> bool {
    empty_null && cell.is_empty()
}

fn infer_type(cells: &[&str], empty_null: bool) -> ColumnType {
    let mut non_empty = cells.iter().filter(|c| !is_null_cell(c, empty_null)).peekable();
    if non_empty.peek().is_none() {
        return ColumnType::Str;
    }

    if cells
        .iter()
        .filter(|c| !is_null_cell(c, empty_null))
        .all(|c| c.parse::<i64>().is_ok())
    {
        return ColumnType::Int;
    }
    if cells
        .iter()
        .filter(|c| !is_null_cell(c, empty_null))
        .all(|c| c.parse::<f64>().is_ok())
    {
        return ColumnType::Float;
    }
    if cells
        .iter()
        .filter(|c| !is_null_cell(c, empty_null))
        .all(|c| matches!(*c, "true" | "false" | "True" | "False"))
    {
        return ColumnType::Bool;
    }
    ColumnType::Str
}

fn parse_typed(
    name: &str,
    cells: &[&str],
    typ: ColumnType,
    empty_null: bool,
) -> Result<Column, FrameError> {
    let parse_err = |cell: &str, typ: &str| {
        FrameError::Decode(format!("could not parse '{cell}' as {typ} in column {name}"))
    };

    match typ {
        ColumnType::Int => {
            let mut out = Vec::with_capacity(cells.len());
            for cell in cells {
                if is_null_cell(cell, empty_null) {
                    out.push(None);
                } else {
                    out.push(Some(cell.parse::<i64>().map_err(|_| parse_err(cell, "int"))?));
                }
            }
            Ok(Column::Int(out))
        }
        ColumnType::Float => {
            let mut out = Vec::with_capacity(cells.len());
            for cell in cells {
                if is_null_cell(cell, empty_null) {
                    out.push(None);
                } else {
                    out.push(Some(cell.parse::<f64>().map_err(|_| parse_err(cell, "float"))?));
                }
            }
            Ok(Column::Float(out))
        }
        ColumnType::Bool => {
            let mut out = Vec::with_capacity(cells.len());
            for cell in cells {
                if is_null_cell(cell, empty_null) {
                    out.push(None);
                } else {
                    out.push(Some(match *cell {
                        "true" | "True" => true,
                        "false" | "False" => false,
                        _ => return Err(parse_err(cell, "bool")),
                    }));
                }
            }
            Ok(Column::Bool(out))
        }
        ColumnType::Str => Ok(Column::Str(
            cells
                .iter()
                .map(|cell| {
                    if is_null_cell(cell, empty_null) {
                        None
                    } else {
                        Some(cell.to_string())
                    }
                })
                .collect(),
        )),
        ColumnType::Enum => Err(FrameError::Decode(format!(
            "enum column {name} requires categories, declare them in the enum specs"
        ))),
    }
}

fn parse_enum(
    name: &str,
    cells: &[&str],
    categories: &[String],
    empty_null: bool,
) -> Result<Column, FrameError> {
    let mut codes = Vec::with_capacity(cells.len());
    for cell in cells {
        if is_null_cell(cell, empty_null) {
            codes.push(None);
            continue;
        }
        match categories.iter().position(|c| c == cell) {
            Some(code) => codes.push(Some(code as u32)),
            None => {
                return Err(FrameError::Decode(format!(
                    "unknown enum value '{cell}' in column {name}"
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
pub fn write_csv<W: io::Write>(frame: &Frame, writer: W) -> Result<(), FrameError> {
    let mut w = csv::Writer::from_writer(writer);

    let names: Vec<&str> = frame.column_names().collect();
    w.write_record(&names)
        .map_err(|e| FrameError::Decode(format!("could not write CSV header: {e}")))?;

    for row in 0..frame.len() {
        let record: Vec<String> = frame
            .columns()
            .map(|(_, col)| cell_to_string(&col.value(row)))
            .collect();
        w.write_record(&record)
            .map_err(|e| FrameError::Decode(format!("could not write CSV row: {e}")))?;
    }

    w.flush()
        .map_err(|e| FrameError::Decode(format!("could not flush CSV writer: {e}")))?;
    Ok(())
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Str(s) => s.clone(),
        Value::Null => String::new(),
    }
}
