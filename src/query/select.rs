//! Select Parsing Module
//!
//! Splits a `select` list into plain columns, aliases (derived columns) and
//! aggregations, and parses alias expressions into trees.

use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::frame::{Aggregation, Expr, Value};
use crate::query::literal::string_expr;

// == Alias ==
/// A derived column: `["=", dst, expr]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub dst: String,
    pub expr: Expr,
}

// == Select Clause ==
/// The parsed `select` list. `columns` is the final projection order and
/// includes alias destinations and aggregation source columns.
#[derive(Debug, Clone, Default)]
pub struct SelectClause {
    pub columns: Vec<String>,
    pub aliases: Vec<Alias>,
    pub aggregations: Vec<Aggregation>,
}

pub fn parse_select(input: Option<&Json>) -> Result<SelectClause> {
    let Some(input) = input else {
        return Ok(SelectClause::default());
    };
    if input.is_null() {
        return Ok(SelectClause::default());
    }

    let items = input.as_array().ok_or_else(|| {
        Error::bad_request(format!("malformed select, must be a list, was: {input}"))
    })?;

    let mut clause = SelectClause::default();
    for item in items {
        match item {
            Json::String(name) => clause.columns.push(name.clone()),
            Json::Array(parts) => {
                if parts.len() < 2 {
                    return Err(Error::bad_request(format!(
                        "malformed expression in select, too short: {item}"
                    )));
                }

                let op = parts[0].as_str().ok_or_else(|| {
                    Error::bad_request(format!(
                        "malformed expression in select, expected a string in first position: {item}"
                    ))
                })?;

                if op == "=" {
                    let alias = parse_alias(&parts[1..])?;
                    clause.columns.push(alias.dst.clone());
                    clause.aliases.push(alias);
                } else {
                    let agg = parse_aggregation(parts)?;
                    clause.columns.push(agg.column.clone());
                    clause.aggregations.push(agg);
                }
            }
            other => {
                return Err(Error::bad_request(format!(
                    "unknown expression in select: {other}"
                )))
            }
        }
    }

    Ok(clause)
}

fn parse_alias(operands: &[Json]) -> Result<Alias> {
    if operands.len() != 2 {
        return Err(Error::bad_request(format!(
            "invalid alias argument length, expected destination column and source expression, was: {operands:?}"
        )));
    }

    let dst = operands[0]
        .as_str()
        .ok_or_else(|| {
            Error::bad_request(format!(
                "invalid alias destination column, was: {}",
                operands[0]
            ))
        })?
        .to_string();

    Ok(Alias {
        dst,
        expr: parse_expr(&operands[1])?,
    })
}

fn parse_aggregation(parts: &[Json]) -> Result<Aggregation> {
    if parts.len() != 2 {
        return Err(Error::bad_request(format!(
            "invalid aggregation expression, expected length 2, was: {parts:?}"
        )));
    }

    let func = parts[0]
        .as_str()
        .ok_or_else(|| {
            Error::bad_request(format!(
                "aggregation function name must be a string, was: {}",
                parts[0]
            ))
        })?
        .to_string();

    let column = parts[1]
        .as_str()
        .ok_or_else(|| {
            Error::bad_request(format!(
                "aggregation column name must be a string, was: {}",
                parts[1]
            ))
        })?
        .to_string();

    Ok(Aggregation { func, column })
}

// == Expression Parsing ==
/// Parses the JSON form of an expression: bare strings are column
/// references, quoted strings are string constants, arrays are operator
/// trees, numbers and bools are constants.
pub fn parse_expr(input: &Json) -> Result<Expr> {
    match input {
        Json::String(s) => Ok(string_expr(s)),
        Json::Bool(b) => Ok(Expr::Lit(Value::Bool(*b))),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Expr::Lit(Value::Int(i)))
            } else if let Some(f) = n.as_f64() {
                Ok(Expr::Lit(Value::Float(f)))
            } else {
                Err(Error::bad_request(format!("unrepresentable number: {n}")))
            }
        }
        Json::Array(parts) => {
            if parts.len() < 2 {
                return Err(Error::bad_request(format!(
                    "malformed expression, too short: {input}"
                )));
            }
            let op = parts[0]
                .as_str()
                .ok_or_else(|| {
                    Error::bad_request(format!(
                        "malformed expression, expected operator string, was: {}",
                        parts[0]
                    ))
                })?
                .to_string();
            let args = parts[1..].iter().map(parse_expr).collect::<Result<_>>()?;
            Ok(Expr::Op(op, args))
        }
        other => Err(Error::bad_request(format!(
            "malformed expression: {other}"
        ))),
    }
}
