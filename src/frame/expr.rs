//! Expression Module
//!
//! Expression trees evaluated into a new column, used for derived (alias)
//! columns and stand-in columns. Int/int arithmetic stays int, mixed numeric
//! promotes to float, `+` concatenates strings. Null operands propagate.

use super::column::{Column, Value};
use super::{Frame, FrameError};

// == Expression ==
/// An expression over a frame: a literal, a column reference, or an operator
/// applied to sub-expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Value),
    Col(String),
    Op(String, Vec<Expr>),
}

impl Expr {
    /// Evaluates the expression into a column of `frame.len()` rows.
    pub fn eval(&self, frame: &Frame) -> Result<Column, FrameError> {
        match self {
            Expr::Lit(value) => Column::constant(value, frame.len()),
            Expr::Col(name) => frame
                .column(name)
                .cloned()
                .ok_or_else(|| FrameError::UnknownColumn(name.clone())),
            Expr::Op(op, args) => {
                let operands: Vec<Column> = args
                    .iter()
                    .map(|a| a.eval(frame))
                    .collect::<Result<_, _>>()?;
                apply_op(op, operands)
            }
        }
    }
}

fn apply_op(op: &str, mut operands: Vec<Column>) -> Result<Column, FrameError> {
    match (op, operands.len()) {
        ("-", 1) => negate(operands.remove(0)),
        ("abs", 1) => abs(operands.remove(0)),
        ("+" | "-" | "*" | "/", n) if n >= 2 => {
            let mut acc = operands.remove(0);
            for rhs in operands {
                acc = binary(op, acc, rhs)?;
            }
            Ok(acc)
        }
        _ => Err(FrameError::Expr(format!(
            "unknown expression operator or arity: {op}/{}",
            operands.len()
        ))),
    }
}

fn negate(col: Column) -> Result<Column, FrameError> {
    match col {
        Column::Int(v) => Ok(Column::Int(v.into_iter().map(|x| x.map(|x| -x)).collect())),
        Column::Float(v) => Ok(Column::Float(v.into_iter().map(|x| x.map(|x| -x)).collect())),
        _ => Err(FrameError::Expr("unary '-' requires a numeric operand".to_string())),
    }
}

fn abs(col: Column) -> Result<Column, FrameError> {
    match col {
        Column::Int(v) => Ok(Column::Int(
            v.into_iter().map(|x| x.map(i64::abs)).collect(),
        )),
        Column::Float(v) => Ok(Column::Float(
            v.into_iter().map(|x| x.map(f64::abs)).collect(),
        )),
        _ => Err(FrameError::Expr("'abs' requires a numeric operand".to_string())),
    }
}

fn binary(op: &str, lhs: Column, rhs: Column) -> Result<Column, FrameError> {
    match (&lhs, &rhs) {
        (Column::Int(a), Column::Int(b)) => {
            let out = a
                .iter()
                .zip(b)
                .map(|(x, y)| match (x, y) {
                    (Some(x), Some(y)) => int_op(op, *x, *y),
                    _ => None,
                })
                .collect();
            Ok(Column::Int(out))
        }
        (Column::Str(a), Column::Str(b)) if op == "+" => {
            let out = a
                .iter()
                .zip(b)
                .map(|(x, y)| match (x, y) {
                    (Some(x), Some(y)) => Some(format!("{x}{y}")),
                    _ => None,
                })
                .collect();
            Ok(Column::Str(out))
        }
        _ if numeric(&lhs) && numeric(&rhs) => {
            let out = (0..lhs.len())
                .map(|i| match (lhs.value(i).as_f64(), rhs.value(i).as_f64()) {
                    (Some(x), Some(y)) => float_op(op, x, y),
                    _ => None,
                })
                .collect();
            Ok(Column::Float(out))
        }
        _ => Err(FrameError::Expr(format!(
            "operator '{op}' is not defined for the operand types"
        ))),
    }
}

fn numeric(col: &Column) -> bool {
    matches!(col, Column::Int(_) | Column::Float(_))
}

fn int_op(op: &str, x: i64, y: i64) -> Option<i64> {
    match op {
        "+" => Some(x.wrapping_add(y)),
        "-" => Some(x.wrapping_sub(y)),
        "*" => Some(x.wrapping_mul(y)),
        // Division by zero yields null rather than aborting the query
        "/" => (y != 0).then(|| x / y),
        _ => None,
    }
}

fn float_op(op: &str, x: f64, y: f64) -> Option<f64> {
    match op {
        "+" => Some(x + y),
        "-" => Some(x - y),
        "*" => Some(x * y),
        "/" => Some(x / y),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn frame() -> Frame {
        Frame::new(vec![
            ("i".to_string(), Column::Int(vec![Some(1), Some(2), None])),
            (
                "f".to_string(),
                Column::Float(vec![Some(0.5), Some(1.5), Some(2.5)]),
            ),
            (
                "s".to_string(),
                Column::Str(vec![
                    Some("a".to_string()),
                    Some("b".to_string()),
                    Some("c".to_string()),
                ]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_literal_broadcast() {
        let col = Expr::Lit(Value::Int(7)).eval(&frame()).unwrap();
        assert_eq!(col, Column::Int(vec![Some(7); 3]));
    }

    #[test]
    fn test_column_reference() {
        let col = Expr::Col("i".to_string()).eval(&frame()).unwrap();
        assert_eq!(col, Column::Int(vec![Some(1), Some(2), None]));
    }

    #[test]
    fn test_int_arithmetic_stays_int() {
        let expr = Expr::Op(
            "+".to_string(),
            vec![Expr::Col("i".to_string()), Expr::Lit(Value::Int(10))],
        );
        assert_eq!(
            expr.eval(&frame()).unwrap(),
            Column::Int(vec![Some(11), Some(12), None])
        );
    }

    #[test]
    fn test_mixed_arithmetic_promotes_to_float() {
        let expr = Expr::Op(
            "*".to_string(),
            vec![Expr::Col("i".to_string()), Expr::Col("f".to_string())],
        );
        assert_eq!(
            expr.eval(&frame()).unwrap(),
            Column::Float(vec![Some(0.5), Some(3.0), None])
        );
    }

    #[test]
    fn test_string_concat() {
        let expr = Expr::Op(
            "+".to_string(),
            vec![
                Expr::Col("s".to_string()),
                Expr::Lit(Value::Str("!".to_string())),
            ],
        );
        assert_eq!(
            expr.eval(&frame()).unwrap(),
            Column::Str(vec![
                Some("a!".to_string()),
                Some("b!".to_string()),
                Some("c!".to_string())
            ])
        );
    }

    #[test]
    fn test_division_by_zero_is_null() {
        let expr = Expr::Op(
            "/".to_string(),
            vec![Expr::Col("i".to_string()), Expr::Lit(Value::Int(0))],
        );
        assert_eq!(
            expr.eval(&frame()).unwrap(),
            Column::Int(vec![None, None, None])
        );
    }

    #[test]
    fn test_unary_minus_and_abs() {
        let expr = Expr::Op("-".to_string(), vec![Expr::Col("i".to_string())]);
        assert_eq!(
            expr.eval(&frame()).unwrap(),
            Column::Int(vec![Some(-1), Some(-2), None])
        );
        let expr = Expr::Op("abs".to_string(), vec![expr]);
        assert_eq!(
            expr.eval(&frame()).unwrap(),
            Column::Int(vec![Some(1), Some(2), None])
        );
    }

    #[test]
    fn test_unknown_operator() {
        let expr = Expr::Op("^".to_string(), vec![Expr::Col("i".to_string())]);
        assert!(matches!(
            expr.eval(&frame()).unwrap_err(),
            FrameError::Expr(_)
        ));
    }

    #[test]
    fn test_nested_expression() {
        // (i + 1) * 2
        let expr = Expr::Op(
            "*".to_string(),
            vec![
                Expr::Op(
                    "+".to_string(),
                    vec![Expr::Col("i".to_string()), Expr::Lit(Value::Int(1))],
                ),
                Expr::Lit(Value::Int(2)),
            ],
        );
        assert_eq!(
            expr.eval(&frame()).unwrap(),
            Column::Int(vec![Some(4), Some(6), None])
        );
    }
}
