//! Typed Column Module
//!
//! A column is a vector of optional values, all of one type. Enum columns
//! store category codes plus an ordered category list; the declared order
//! governs comparisons and sorting.

use std::cmp::Ordering;
use std::str::FromStr;

use super::FrameError;

// == Scalar Value ==
/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Null => "null",
        }
    }
}

// == Column Type ==
/// The declared or inferred type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Str,
    Enum,
}

impl FromStr for ColumnType {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, FrameError> {
        match s {
            "int" => Ok(ColumnType::Int),
            "float" => Ok(ColumnType::Float),
            "bool" | "boolean" => Ok(ColumnType::Bool),
            "string" => Ok(ColumnType::Str),
            "enum" => Ok(ColumnType::Enum),
            other => Err(FrameError::Decode(format!("unknown column type: {other}"))),
        }
    }
}

// == Column ==
/// A typed column of optional values.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Str(Vec<Option<String>>),
    Enum {
        codes: Vec<Option<u32>>,
        categories: Vec<String>,
    },
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Str(v) => v.len(),
            Column::Enum { codes, .. } => codes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Int(_) => ColumnType::Int,
            Column::Float(_) => ColumnType::Float,
            Column::Bool(_) => ColumnType::Bool,
            Column::Str(_) => ColumnType::Str,
            Column::Enum { .. } => ColumnType::Enum,
        }
    }

    /// The cell at `row`. Enum cells surface as their category string.
    pub fn value(&self, row: usize) -> Value {
        match self {
            Column::Int(v) => v[row].map_or(Value::Null, Value::Int),
            Column::Float(v) => v[row].map_or(Value::Null, Value::Float),
            Column::Bool(v) => v[row].map_or(Value::Null, Value::Bool),
            Column::Str(v) => v[row]
                .as_ref()
                .map_or(Value::Null, |s| Value::Str(s.clone())),
            Column::Enum { codes, categories } => codes[row]
                .map_or(Value::Null, |c| Value::Str(categories[c as usize].clone())),
        }
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            Column::Int(v) => v[row].is_none(),
            Column::Float(v) => v[row].is_none(),
            Column::Bool(v) => v[row].is_none(),
            Column::Str(v) => v[row].is_none(),
            Column::Enum { codes, .. } => codes[row].is_none(),
        }
    }

    /// Rough estimate of the heap footprint, used for cache accounting.
    pub fn byte_size(&self) -> usize {
        match self {
            Column::Int(v) => v.len() * 9,
            Column::Float(v) => v.len() * 9,
            Column::Bool(v) => v.len() * 2,
            Column::Str(v) => {
                v.len() * 24 + v.iter().flatten().map(String::len).sum::<usize>()
            }
            Column::Enum { codes, categories } => {
                codes.len() * 5 + categories.iter().map(String::len).sum::<usize>()
            }
        }
    }

    /// Gathers the listed rows into a new column.
    pub fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Int(v) => Column::Int(rows.iter().map(|&i| v[i]).collect()),
            Column::Float(v) => Column::Float(rows.iter().map(|&i| v[i]).collect()),
            Column::Bool(v) => Column::Bool(rows.iter().map(|&i| v[i]).collect()),
            Column::Str(v) => Column::Str(rows.iter().map(|&i| v[i].clone()).collect()),
            Column::Enum { codes, categories } => Column::Enum {
                codes: rows.iter().map(|&i| codes[i]).collect(),
                categories: categories.clone(),
            },
        }
    }

    /// Orders two rows of this column. Nulls sort first; enums sort by
    /// category order, floats by total order.
    pub fn cmp_rows(&self, a: usize, b: usize) -> Ordering {
        fn cmp_opt<T: Ord>(x: &Option<T>, y: &Option<T>) -> Ordering {
            match (x, y) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => x.cmp(y),
            }
        }

        match self {
            Column::Int(v) => cmp_opt(&v[a], &v[b]),
            Column::Bool(v) => cmp_opt(&v[a], &v[b]),
            Column::Str(v) => cmp_opt(&v[a], &v[b]),
            Column::Enum { codes, .. } => cmp_opt(&codes[a], &codes[b]),
            Column::Float(v) => match (&v[a], &v[b]) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => x.total_cmp(y),
            },
        }
    }

    /// Broadcasts a scalar into a column of the given length.
    pub fn constant(value: &Value, len: usize) -> Result<Column, FrameError> {
        match value {
            Value::Int(i) => Ok(Column::Int(vec![Some(*i); len])),
            Value::Float(f) => Ok(Column::Float(vec![Some(*f); len])),
            Value::Bool(b) => Ok(Column::Bool(vec![Some(*b); len])),
            Value::Str(s) => Ok(Column::Str(vec![Some(s.clone()); len])),
            Value::Null => Err(FrameError::TypeMismatch(
                "cannot build a column from a null constant".to_string(),
            )),
        }
    }

    /// Code of `category` in an enum column, if declared.
    pub fn enum_code(&self, category: &str) -> Option<u32> {
        match self {
            Column::Enum { categories, .. } => categories
                .iter()
                .position(|c| c == category)
                .map(|p| p as u32),
            _ => None,
        }
    }
}
