//! Filter Clause Module
//!
//! The tagged filter AST applied by `Frame::filter`. Comparison semantics
//! follow SQL conventions: null cells never match, except under `isnull`.

use std::str::FromStr;

use super::column::{Column, Value};
use super::{Frame, FrameError};

// == Comparator ==
/// Comparison operator of a `Cmp` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    In,
    Like,
    IsNull,
    AnyBits,
    AllBits,
}

impl FromStr for Comparator {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, FrameError> {
        match s {
            "<" => Ok(Comparator::Lt),
            "<=" => Ok(Comparator::Lte),
            ">" => Ok(Comparator::Gt),
            ">=" => Ok(Comparator::Gte),
            "=" | "==" => Ok(Comparator::Eq),
            "!=" => Ok(Comparator::Neq),
            "in" => Ok(Comparator::In),
            "like" => Ok(Comparator::Like),
            "isnull" => Ok(Comparator::IsNull),
            "any_bits" => Ok(Comparator::AnyBits),
            "all_bits" => Ok(Comparator::AllBits),
            other => Err(FrameError::TypeMismatch(format!(
                "unknown filter operator: {other}"
            ))),
        }
    }
}

// == Comparison Argument ==
/// Right-hand side of a comparison: a literal, another column, or a literal
/// list (for `in`).
#[derive(Debug, Clone, PartialEq)]
pub enum CmpArg {
    Value(Value),
    Column(String),
    List(Vec<Value>),
}

// == Clause ==
/// A node in the filter AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    And(Vec<Clause>),
    Or(Vec<Clause>),
    Not(Box<Clause>),
    Cmp {
        op: Comparator,
        column: String,
        arg: CmpArg,
    },
    /// Identity filter, keeps every row.
    Null,
}

impl Clause {
    /// Computes the row mask for this clause over `frame`.
    pub fn mask(&self, frame: &Frame) -> Result<Vec<bool>, FrameError> {
        let len = frame.len();
        match self {
            Clause::Null => Ok(vec![true; len]),
            Clause::And(children) => {
                let mut mask = vec![true; len];
                for child in children {
                    let m = child.mask(frame)?;
                    for (a, b) in mask.iter_mut().zip(m) {
                        *a = *a && b;
                    }
                }
                Ok(mask)
            }
            Clause::Or(children) => {
                if children.is_empty() {
                    return Ok(vec![true; len]);
                }
                let mut mask = vec![false; len];
                for child in children {
                    let m = child.mask(frame)?;
                    for (a, b) in mask.iter_mut().zip(m) {
                        *a = *a || b;
                    }
                }
                Ok(mask)
            }
            Clause::Not(child) => {
                let mut mask = child.mask(frame)?;
                for b in mask.iter_mut() {
                    *b = !*b;
                }
                Ok(mask)
            }
            Clause::Cmp { op, column, arg } => cmp_mask(frame, *op, column, arg),
        }
    }
}

fn cmp_mask(
    frame: &Frame,
    op: Comparator,
    column: &str,
    arg: &CmpArg,
) -> Result<Vec<bool>, FrameError> {
    let col = frame
        .column(column)
        .ok_or_else(|| FrameError::UnknownColumn(column.to_string()))?;

    match op {
        Comparator::IsNull => Ok((0..col.len()).map(|i| col.is_null(i)).collect()),
        Comparator::In => match arg {
            CmpArg::List(values) => in_mask(col, values),
            _ => Err(FrameError::TypeMismatch(format!(
                "'in' on column {column} requires a list or sub-query argument"
            ))),
        },
        Comparator::AnyBits | Comparator::AllBits => bits_mask(col, op, column, arg),
        Comparator::Like => like_mask(col, column, arg),
        _ => match arg {
            CmpArg::Value(value) => ordered_mask(col, op, column, value),
            CmpArg::Column(other) => {
                let rhs = frame
                    .column(other)
                    .ok_or_else(|| FrameError::UnknownColumn(other.to_string()))?;
                column_pair_mask(col, rhs, op, column, other)
            }
            CmpArg::List(_) => Err(FrameError::TypeMismatch(format!(
                "list argument is only valid with 'in', not with {op:?} on column {column}"
            ))),
        },
    }
}

fn ord_matches(op: Comparator, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        Comparator::Lt => ord == Less,
        Comparator::Lte => ord != Greater,
        Comparator::Gt => ord == Greater,
        Comparator::Gte => ord != Less,
        Comparator::Eq => ord == Equal,
        Comparator::Neq => ord != Equal,
        _ => false,
    }
}

fn ordered_mask(
    col: &Column,
    op: Comparator,
    name: &str,
    value: &Value,
) -> Result<Vec<bool>, FrameError> {
    let mismatch = || {
        FrameError::TypeMismatch(format!(
            "cannot compare {} column {name} with {} argument",
            type_label(col),
            value.type_name()
        ))
    };

    match (col, value) {
        (Column::Int(v), Value::Int(rhs)) => {
            Ok(v.iter().map(|x| x.is_some_and(|x| ord_matches(op, x.cmp(rhs)))).collect())
        }
        (Column::Int(v), Value::Float(rhs)) => Ok(v
            .iter()
            .map(|x| x.is_some_and(|x| ord_matches(op, (x as f64).total_cmp(rhs))))
            .collect()),
        (Column::Float(v), _) => {
            let rhs = value.as_f64().ok_or_else(mismatch)?;
            Ok(v.iter()
                .map(|x| x.is_some_and(|x| ord_matches(op, x.total_cmp(&rhs))))
                .collect())
        }
        (Column::Bool(v), Value::Bool(rhs)) => match op {
            Comparator::Eq | Comparator::Neq => Ok(v
                .iter()
                .map(|x| x.is_some_and(|x| ord_matches(op, x.cmp(rhs))))
                .collect()),
            _ => Err(mismatch()),
        },
        (Column::Str(v), Value::Str(rhs)) => Ok(v
            .iter()
            .map(|x| x.as_ref().is_some_and(|x| ord_matches(op, x.as_str().cmp(rhs.as_str()))))
            .collect()),
        (Column::Enum { codes, .. }, Value::Str(rhs)) => {
            match col.enum_code(rhs) {
                Some(code) => Ok(codes
                    .iter()
                    .map(|x| x.is_some_and(|x| ord_matches(op, x.cmp(&code))))
                    .collect()),
                // An undeclared category equals nothing; ordering against it
                // is undefined.
                None => match op {
                    Comparator::Eq => Ok(vec![false; codes.len()]),
                    Comparator::Neq => Ok(codes.iter().map(|x| x.is_some()).collect()),
                    _ => Err(FrameError::TypeMismatch(format!(
                        "unknown enum value '{rhs}' in comparison on column {name}"
                    ))),
                },
            }
        }
        _ => Err(mismatch()),
    }
}

fn column_pair_mask(
    lhs: &Column,
    rhs: &Column,
    op: Comparator,
    lname: &str,
    rname: &str,
) -> Result<Vec<bool>, FrameError> {
    let as_f64 = |c: &Column, i: usize| -> Option<f64> { c.value(i).as_f64() };

    match (lhs, rhs) {
        (Column::Int(a), Column::Int(b)) => Ok(a
            .iter()
            .zip(b)
            .map(|(x, y)| match (x, y) {
                (Some(x), Some(y)) => ord_matches(op, x.cmp(y)),
                _ => false,
            })
            .collect()),
        (Column::Str(a), Column::Str(b)) => Ok(a
            .iter()
            .zip(b)
            .map(|(x, y)| match (x, y) {
                (Some(x), Some(y)) => ord_matches(op, x.cmp(y)),
                _ => false,
            })
            .collect()),
        (Column::Bool(a), Column::Bool(b)) if matches!(op, Comparator::Eq | Comparator::Neq) => {
            Ok(a.iter()
                .zip(b)
                .map(|(x, y)| match (x, y) {
                    (Some(x), Some(y)) => ord_matches(op, x.cmp(y)),
                    _ => false,
                })
                .collect())
        }
        _ if matches!(lhs, Column::Int(_) | Column::Float(_))
            && matches!(rhs, Column::Int(_) | Column::Float(_)) =>
        {
            Ok((0..lhs.len())
                .map(|i| match (as_f64(lhs, i), as_f64(rhs, i)) {
                    (Some(x), Some(y)) => ord_matches(op, x.total_cmp(&y)),
                    _ => false,
                })
                .collect())
        }
        _ => Err(FrameError::TypeMismatch(format!(
            "cannot compare column {lname} ({}) with column {rname} ({})",
            type_label(lhs),
            type_label(rhs)
        ))),
    }
}

fn in_mask(col: &Column, values: &[Value]) -> Result<Vec<bool>, FrameError> {
    match col {
        Column::Int(v) => {
            let set: Vec<i64> = values
                .iter()
                .filter_map(|x| match x {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect();
            Ok(v.iter().map(|x| x.is_some_and(|x| set.contains(&x))).collect())
        }
        Column::Float(v) => {
            let set: Vec<f64> = values.iter().filter_map(|x| x.as_f64()).collect();
            Ok(v.iter()
                .map(|x| x.is_some_and(|x| set.iter().any(|s| s.total_cmp(&x).is_eq())))
                .collect())
        }
        Column::Bool(v) => {
            let set: Vec<bool> = values
                .iter()
                .filter_map(|x| match x {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            Ok(v.iter().map(|x| x.is_some_and(|x| set.contains(&x))).collect())
        }
        Column::Str(v) => {
            let set: Vec<&str> = values
                .iter()
                .filter_map(|x| match x {
                    Value::Str(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect();
            Ok(v.iter()
                .map(|x| x.as_ref().is_some_and(|x| set.contains(&x.as_str())))
                .collect())
        }
        Column::Enum { codes, .. } => {
            let set: Vec<u32> = values
                .iter()
                .filter_map(|x| match x {
                    Value::Str(s) => col.enum_code(s),
                    _ => None,
                })
                .collect();
            Ok(codes.iter().map(|x| x.is_some_and(|x| set.contains(&x))).collect())
        }
    }
}

fn bits_mask(
    col: &Column,
    op: Comparator,
    name: &str,
    arg: &CmpArg,
) -> Result<Vec<bool>, FrameError> {
    let (Column::Int(v), CmpArg::Value(Value::Int(bits))) = (col, arg) else {
        return Err(FrameError::TypeMismatch(format!(
            "bit comparisons require an int column and int argument, column {name}"
        )));
    };

    let bits = *bits;
    Ok(v.iter()
        .map(|x| {
            x.is_some_and(|x| match op {
                Comparator::AnyBits => x & bits != 0,
                _ => x & bits == bits,
            })
        })
        .collect())
}

fn like_mask(col: &Column, name: &str, arg: &CmpArg) -> Result<Vec<bool>, FrameError> {
    let CmpArg::Value(Value::Str(pattern)) = arg else {
        return Err(FrameError::TypeMismatch(format!(
            "'like' on column {name} requires a quoted string pattern"
        )));
    };

    match col {
        Column::Str(v) => Ok(v
            .iter()
            .map(|x| x.as_ref().is_some_and(|x| like_match(pattern, x)))
            .collect()),
        Column::Enum { codes, categories } => {
            // One match per category, then a code lookup per row.
            let matches: Vec<bool> = categories.iter().map(|c| like_match(pattern, c)).collect();
            Ok(codes
                .iter()
                .map(|x| x.is_some_and(|x| matches[x as usize]))
                .collect())
        }
        _ => Err(FrameError::TypeMismatch(format!(
            "'like' is only defined for string columns, column {name} is {}",
            type_label(col)
        ))),
    }
}

/// SQL LIKE matching: `%` matches any run, `_` a single character.
/// Case sensitive. Classic two-pointer scan with backtracking on `%`.
pub fn like_match(pattern: &str, s: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = s.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let (mut star, mut star_ti) = (None::<usize>, 0usize);

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(sp) = star {
            pi = sp + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}

fn type_label(col: &Column) -> &'static str {
    match col {
        Column::Int(_) => "int",
        Column::Float(_) => "float",
        Column::Bool(_) => "bool",
        Column::Str(_) => "string",
        Column::Enum { .. } => "enum",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn frame() -> Frame {
        Frame::new(vec![
            (
                "i".to_string(),
                Column::Int(vec![Some(1), Some(2), None, Some(4)]),
            ),
            (
                "s".to_string(),
                Column::Str(vec![
                    Some("apple".to_string()),
                    Some("banana".to_string()),
                    Some("cherry".to_string()),
                    None,
                ]),
            ),
            (
                "j".to_string(),
                Column::Int(vec![Some(2), Some(2), Some(2), Some(2)]),
            ),
        ])
        .unwrap()
    }

    fn cmp(op: &str, column: &str, arg: CmpArg) -> Clause {
        Clause::Cmp {
            op: op.parse().unwrap(),
            column: column.to_string(),
            arg,
        }
    }

    #[test]
    fn test_ordered_comparison() {
        let mask = cmp(">", "i", CmpArg::Value(Value::Int(1)))
            .mask(&frame())
            .unwrap();
        assert_eq!(mask, vec![false, true, false, true]);
    }

    #[test]
    fn test_null_never_matches() {
        let mask = cmp("!=", "i", CmpArg::Value(Value::Int(99)))
            .mask(&frame())
            .unwrap();
        assert_eq!(mask, vec![true, true, false, true]);
    }

    #[test]
    fn test_isnull() {
        let mask = cmp("isnull", "i", CmpArg::Value(Value::Null))
            .mask(&frame())
            .unwrap();
        assert_eq!(mask, vec![false, false, true, false]);
    }

    #[test]
    fn test_column_reference_argument() {
        let mask = cmp(">=", "i", CmpArg::Column("j".to_string()))
            .mask(&frame())
            .unwrap();
        assert_eq!(mask, vec![false, true, false, true]);
    }

    #[test]
    fn test_in_list() {
        let mask = cmp(
            "in",
            "i",
            CmpArg::List(vec![Value::Int(1), Value::Int(4)]),
        )
        .mask(&frame())
        .unwrap();
        assert_eq!(mask, vec![true, false, false, true]);
    }

    #[test]
    fn test_and_or_not() {
        let clause = Clause::And(vec![
            cmp(">", "i", CmpArg::Value(Value::Int(0))),
            Clause::Not(Box::new(cmp("=", "i", CmpArg::Value(Value::Int(2))))),
        ]);
        assert_eq!(clause.mask(&frame()).unwrap(), vec![true, false, true, true]);

        let clause = Clause::Or(vec![
            cmp("=", "i", CmpArg::Value(Value::Int(1))),
            cmp("=", "i", CmpArg::Value(Value::Int(2))),
        ]);
        assert_eq!(clause.mask(&frame()).unwrap(), vec![true, true, false, false]);
    }

    #[test]
    fn test_empty_conjunction_is_identity() {
        assert_eq!(
            Clause::And(vec![]).mask(&frame()).unwrap(),
            vec![true; 4]
        );
        assert_eq!(Clause::Or(vec![]).mask(&frame()).unwrap(), vec![true; 4]);
    }

    #[test]
    fn test_like() {
        let mask = cmp("like", "s", CmpArg::Value(Value::Str("%an%".to_string())))
            .mask(&frame())
            .unwrap();
        assert_eq!(mask, vec![false, true, false, false]);
    }

    #[test]
    fn test_like_match_patterns() {
        assert!(like_match("%", ""));
        assert!(like_match("a%", "abc"));
        assert!(like_match("%ica", "erica"));
        assert!(like_match("a_c", "abc"));
        assert!(!like_match("a_c", "abbc"));
        assert!(!like_match("abc", "abcd"));
        assert!(like_match("%b%d", "abcd"));
    }

    #[test]
    fn test_bits() {
        let f = Frame::new(vec![(
            "flags".to_string(),
            Column::Int(vec![Some(0b101), Some(0b010), None]),
        )])
        .unwrap();
        let mask = cmp("any_bits", "flags", CmpArg::Value(Value::Int(0b100)))
            .mask(&f)
            .unwrap();
        assert_eq!(mask, vec![true, false, false]);
        let mask = cmp("all_bits", "flags", CmpArg::Value(Value::Int(0b101)))
            .mask(&f)
            .unwrap();
        assert_eq!(mask, vec![true, false, false]);
    }

    #[test]
    fn test_unknown_column_errors() {
        let err = cmp("=", "missing", CmpArg::Value(Value::Int(0)))
            .mask(&frame())
            .unwrap_err();
        assert!(matches!(err, FrameError::UnknownColumn(_)));
    }

    #[test]
    fn test_enum_comparison_uses_declaration_order() {
        let f = Frame::new(vec![(
            "size".to_string(),
            Column::Enum {
                codes: vec![Some(0), Some(1), Some(2)],
                categories: vec!["S".to_string(), "M".to_string(), "L".to_string()],
            },
        )])
        .unwrap();
        let mask = cmp("<", "size", CmpArg::Value(Value::Str("L".to_string())))
            .mask(&f)
            .unwrap();
        assert_eq!(mask, vec![true, true, false]);

        // Unknown category: equality is simply false everywhere.
        let mask = cmp("=", "size", CmpArg::Value(Value::Str("XL".to_string())))
            .mask(&f)
            .unwrap();
        assert_eq!(mask, vec![false, false, false]);
    }
}
