//! Frame Module
//!
//! An immutable, typed, columnar table and the primitive operations the
//! query evaluator is built from. Operations return new frames; a stored
//! frame is never mutated.

mod clause;
mod column;
pub mod csv;
mod expr;
pub mod json;

use std::collections::HashMap;

use thiserror::Error;

pub use self::clause::{like_match, Clause, CmpArg, Comparator};
pub use self::column::{Column, ColumnType, Value};
pub use self::csv::CsvOptions;
pub use self::expr::Expr;
pub use self::json::JsonOptions;

// == Frame Error ==
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("column length mismatch for {0}")]
    LengthMismatch(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("unknown aggregation function: {0}")]
    UnknownAggregation(String),

    #[error("invalid expression: {0}")]
    Expr(String),

    #[error("{0}")]
    Decode(String),
}

// == Sort Key ==
/// One `order by` entry: a column and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub reverse: bool,
}

// == Aggregation ==
/// One aggregation: a function name applied to a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub func: String,
    pub column: String,
}

// == Frame ==
/// An immutable columnar table. Columns keep their insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    columns: Vec<(String, Column)>,
}

impl Frame {
    /// Builds a frame, checking name uniqueness and equal column lengths.
    pub fn new(columns: Vec<(String, Column)>) -> Result<Frame, FrameError> {
        let len = columns.first().map_or(0, |(_, c)| c.len());
        for (name, col) in &columns {
            if col.len() != len {
                return Err(FrameError::LengthMismatch(name.clone()));
            }
            if columns.iter().filter(|(n, _)| n == name).count() > 1 {
                return Err(FrameError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Frame { columns })
    }

    pub fn empty() -> Frame {
        Frame::default()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Rough heap footprint estimate for cache accounting.
    pub fn byte_size(&self) -> usize {
        self.columns
            .iter()
            .map(|(n, c)| n.len() + c.byte_size())
            .sum()
    }

    /// Gathers the listed rows from every column.
    fn take(&self, rows: &[usize]) -> Frame {
        Frame {
            columns: self
                .columns
                .iter()
                .map(|(n, c)| (n.clone(), c.take(rows)))
                .collect(),
        }
    }

    // == Filter ==
    /// Keeps the rows matched by the clause tree.
    pub fn filter(&self, clause: &Clause) -> Result<Frame, FrameError> {
        let mask = clause.mask(self)?;
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect();
        Ok(self.take(&rows))
    }

    // == Sort ==
    /// Stable multi-key sort. Nulls sort first in ascending order.
    pub fn sort(&self, keys: &[SortKey]) -> Result<Frame, FrameError> {
        if keys.is_empty() {
            return Ok(self.clone());
        }

        let cols: Vec<(&Column, bool)> = keys
            .iter()
            .map(|k| {
                self.column(&k.column)
                    .map(|c| (c, k.reverse))
                    .ok_or_else(|| FrameError::UnknownColumn(k.column.clone()))
            })
            .collect::<Result<_, _>>()?;

        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            for (col, reverse) in &cols {
                let ord = col.cmp_rows(a, b);
                let ord = if *reverse { ord.reverse() } else { ord };
                if !ord.is_eq() {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });

        Ok(self.take(&order))
    }

    // == Group By ==
    /// Groups rows by the given columns. An empty column list yields a single
    /// global group (or none for an empty frame).
    pub fn group_by(&self, cols: &[String]) -> Result<Grouper<'_>, FrameError> {
        let key_cols: Vec<&Column> = cols
            .iter()
            .map(|n| {
                self.column(n)
                    .ok_or_else(|| FrameError::UnknownColumn(n.clone()))
            })
            .collect::<Result<_, _>>()?;

        let mut groups: Vec<Vec<usize>> = Vec::new();
        if cols.is_empty() {
            if self.len() > 0 {
                groups.push((0..self.len()).collect());
            }
        } else {
            let mut index: HashMap<Vec<KeyAtom>, usize> = HashMap::new();
            for row in 0..self.len() {
                let key: Vec<KeyAtom> = key_cols.iter().map(|c| KeyAtom::of(c, row)).collect();
                match index.get(&key) {
                    Some(&g) => groups[g].push(row),
                    None => {
                        index.insert(key, groups.len());
                        groups.push(vec![row]);
                    }
                }
            }
        }

        Ok(Grouper {
            frame: self,
            keys: cols.to_vec(),
            groups,
        })
    }

    // == Distinct ==
    /// Reduces to unique tuples over the named columns, keeping the first
    /// occurrence of each. Full rows are retained.
    pub fn distinct(&self, cols: &[String]) -> Result<Frame, FrameError> {
        if cols.is_empty() {
            return Ok(self.clone());
        }

        let key_cols: Vec<&Column> = cols
            .iter()
            .map(|n| {
                self.column(n)
                    .ok_or_else(|| FrameError::UnknownColumn(n.clone()))
            })
            .collect::<Result<_, _>>()?;

        let mut seen: HashMap<Vec<KeyAtom>, ()> = HashMap::new();
        let mut rows = Vec::new();
        for row in 0..self.len() {
            let key: Vec<KeyAtom> = key_cols.iter().map(|c| KeyAtom::of(c, row)).collect();
            if seen.insert(key, ()).is_none() {
                rows.push(row);
            }
        }

        Ok(self.take(&rows))
    }

    // == Select ==
    /// Keeps only the named columns, in the given order.
    pub fn select(&self, cols: &[String]) -> Result<Frame, FrameError> {
        let columns = cols
            .iter()
            .map(|n| {
                self.column(n)
                    .map(|c| (n.clone(), c.clone()))
                    .ok_or_else(|| FrameError::UnknownColumn(n.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Frame::new(columns)
    }

    // == Eval ==
    /// Evaluates an expression into column `dst`, replacing it if present.
    pub fn eval(&self, dst: &str, expr: &Expr) -> Result<Frame, FrameError> {
        let col = expr.eval(self)?;
        let mut columns = self.columns.clone();
        match columns.iter_mut().find(|(n, _)| n == dst) {
            Some((_, existing)) => *existing = col,
            None => columns.push((dst.to_string(), col)),
        }
        Ok(Frame { columns })
    }

    // == Slice ==
    /// Rows `[start, stop)`, clamped to the frame bounds.
    pub fn slice(&self, start: usize, stop: usize) -> Frame {
        let len = self.len();
        let start = start.min(len);
        let stop = stop.clamp(start, len);
        let rows: Vec<usize> = (start..stop).collect();
        self.take(&rows)
    }
}

// == Group Key Atom ==
/// Hashable projection of a cell for grouping and distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyAtom {
    Int(i64),
    /// Bit pattern of the float, which makes equal floats equal keys.
    Float(u64),
    Bool(bool),
    Str(String),
    Null,
}

impl KeyAtom {
    fn of(col: &Column, row: usize) -> KeyAtom {
        match col {
            Column::Int(v) => v[row].map_or(KeyAtom::Null, KeyAtom::Int),
            Column::Float(v) => v[row].map_or(KeyAtom::Null, |f| KeyAtom::Float(f.to_bits())),
            Column::Bool(v) => v[row].map_or(KeyAtom::Null, KeyAtom::Bool),
            Column::Str(v) => v[row]
                .as_ref()
                .map_or(KeyAtom::Null, |s| KeyAtom::Str(s.clone())),
            Column::Enum { codes, .. } => {
                codes[row].map_or(KeyAtom::Null, |c| KeyAtom::Int(c as i64))
            }
        }
    }
}

// == Grouper ==
/// The result of `Frame::group_by`, ready to aggregate.
pub struct Grouper<'a> {
    frame: &'a Frame,
    keys: Vec<String>,
    groups: Vec<Vec<usize>>,
}

impl Grouper<'_> {
    /// Aggregates each group, producing one row per group. The result carries
    /// the group-by columns first, then one column per aggregation, named
    /// after its source column.
    pub fn aggregate(&self, aggs: &[Aggregation]) -> Result<Frame, FrameError> {
        let representatives: Vec<usize> = self.groups.iter().map(|g| g[0]).collect();

        let mut columns: Vec<(String, Column)> = Vec::with_capacity(self.keys.len() + aggs.len());
        for key in &self.keys {
            let col = self
                .frame
                .column(key)
                .ok_or_else(|| FrameError::UnknownColumn(key.clone()))?;
            columns.push((key.clone(), col.take(&representatives)));
        }

        for agg in aggs {
            let col = self
                .frame
                .column(&agg.column)
                .ok_or_else(|| FrameError::UnknownColumn(agg.column.clone()))?;
            let aggregated = aggregate_column(col, &self.groups, &agg.func)?;
            columns.push((agg.column.clone(), aggregated));
        }

        Frame::new(columns)
    }
}

fn aggregate_column(
    col: &Column,
    groups: &[Vec<usize>],
    func: &str,
) -> Result<Column, FrameError> {
    let type_err = |func: &str| {
        FrameError::TypeMismatch(format!(
            "aggregation '{func}' is not defined for this column type"
        ))
    };

    match func {
        "count" => Ok(Column::Int(
            groups
                .iter()
                .map(|rows| Some(rows.iter().filter(|&&r| !col.is_null(r)).count() as i64))
                .collect(),
        )),
        "sum" => match col {
            Column::Int(v) => Ok(Column::Int(
                groups
                    .iter()
                    .map(|rows| Some(rows.iter().filter_map(|&r| v[r]).sum::<i64>()))
                    .collect(),
            )),
            Column::Float(v) => Ok(Column::Float(
                groups
                    .iter()
                    .map(|rows| Some(rows.iter().filter_map(|&r| v[r]).sum::<f64>()))
                    .collect(),
            )),
            _ => Err(type_err(func)),
        },
        "mean" => match col {
            Column::Int(_) | Column::Float(_) => Ok(Column::Float(
                groups
                    .iter()
                    .map(|rows| {
                        let vals: Vec<f64> = rows
                            .iter()
                            .filter_map(|&r| col.value(r).as_f64())
                            .collect();
                        if vals.is_empty() {
                            None
                        } else {
                            Some(vals.iter().sum::<f64>() / vals.len() as f64)
                        }
                    })
                    .collect(),
            )),
            _ => Err(type_err(func)),
        },
        "min" | "max" => extremum(col, groups, func == "max"),
        other => Err(FrameError::UnknownAggregation(other.to_string())),
    }
}

fn extremum(col: &Column, groups: &[Vec<usize>], max: bool) -> Result<Column, FrameError> {
    // One representative row index per group, picked by the column's own
    // ordering; nulls are skipped.
    let pick = |rows: &[usize]| -> Option<usize> {
        rows.iter()
            .copied()
            .filter(|&r| !col.is_null(r))
            .reduce(|best, r| {
                let ord = col.cmp_rows(r, best);
                let better = if max { ord.is_gt() } else { ord.is_lt() };
                if better {
                    r
                } else {
                    best
                }
            })
    };

    let picks: Vec<Option<usize>> = groups.iter().map(|rows| pick(rows)).collect();

    match col {
        Column::Int(v) => Ok(Column::Int(picks.iter().map(|p| p.and_then(|r| v[r])).collect())),
        Column::Float(v) => Ok(Column::Float(
            picks.iter().map(|p| p.and_then(|r| v[r])).collect(),
        )),
        Column::Str(v) => Ok(Column::Str(
            picks.iter().map(|p| p.and_then(|r| v[r].clone())).collect(),
        )),
        Column::Enum { codes, categories } => Ok(Column::Enum {
            codes: picks.iter().map(|p| p.and_then(|r| codes[r])).collect(),
            categories: categories.clone(),
        }),
        Column::Bool(_) => Err(FrameError::TypeMismatch(
            "min/max is not defined for bool columns".to_string(),
        )),
    }
}
