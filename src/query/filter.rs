//! Filter Parsing Module
//!
//! Parses the JSON array form of a `where` clause into a typed tree. The
//! parsed tree still carries unresolved sub-queries (for `in`); resolving
//! them against a frame produces the clause tree the frame library applies.

use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::frame::{Clause, CmpArg, Comparator, Frame, Value};
use crate::query::literal::{is_quoted, trim_quotes};
use crate::query::QueryNode;

// == Parsed Filter ==
/// A filter tree as parsed from JSON. Identical to `Clause` except that a
/// comparison argument may be a not-yet-evaluated sub-query.
#[derive(Debug, Clone)]
pub enum FilterNode {
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
    Cmp {
        op: Comparator,
        column: String,
        arg: FilterArg,
    },
    Null,
}

#[derive(Debug, Clone)]
pub enum FilterArg {
    Value(Value),
    Column(String),
    List(Vec<Value>),
    SubQuery(Box<QueryNode>),
}

// == Parse ==
pub fn parse_filter(input: Option<&Json>) -> Result<FilterNode> {
    let Some(input) = input else {
        return Ok(FilterNode::Null);
    };
    if input.is_null() {
        return Ok(FilterNode::Null);
    }

    let clause = input.as_array().ok_or_else(|| {
        Error::bad_request(format!(
            "malformed filter clause, expected list of clauses, was: {input}"
        ))
    })?;

    if clause.len() < 2 {
        return Err(Error::bad_request(format!(
            "malformed filter clause, too short: {input}"
        )));
    }

    let operator = clause[0].as_str().ok_or_else(|| {
        Error::bad_request(format!(
            "malformed filter clause, expected operator string, was: {}",
            clause[0]
        ))
    })?;

    match operator {
        "&" | "and" | "AND" => {
            if clause.len() < 3 {
                return Err(Error::bad_request(format!(
                    "'{operator}' requires at least two operands, was: {input}"
                )));
            }
            Ok(FilterNode::And(parse_children(&clause[1..])?))
        }
        "|" | "or" | "OR" => {
            if clause.len() < 3 {
                return Err(Error::bad_request(format!(
                    "'{operator}' requires at least two operands, was: {input}"
                )));
            }
            Ok(FilterNode::Or(parse_children(&clause[1..])?))
        }
        "!" | "not" | "NOT" => {
            if clause.len() != 2 {
                return Err(Error::bad_request(format!(
                    "invalid 'not' filter clause length, expected [!, [...]], was: {input}"
                )));
            }
            Ok(FilterNode::Not(Box::new(parse_filter(Some(&clause[1]))?)))
        }
        comparison => {
            if clause.len() != 3 {
                return Err(Error::bad_request(format!(
                    "invalid filter clause length, expected [operator, column, value], was: {input}"
                )));
            }

            let op: Comparator = comparison
                .parse()
                .map_err(|e| Error::bad_request(format!("{e}")))?;

            let column = clause[1]
                .as_str()
                .ok_or_else(|| {
                    Error::bad_request(format!(
                        "invalid column name, expected string, was: {}",
                        clause[1]
                    ))
                })?
                .to_string();

            let arg = parse_arg(op, &clause[2])?;
            Ok(FilterNode::Cmp { op, column, arg })
        }
    }
}

fn parse_children(children: &[Json]) -> Result<Vec<FilterNode>> {
    children
        .iter()
        .map(|c| parse_filter(Some(c)))
        .collect()
}

fn parse_arg(op: Comparator, arg: &Json) -> Result<FilterArg> {
    match arg {
        Json::String(s) => {
            if is_quoted(s) {
                Ok(FilterArg::Value(Value::Str(trim_quotes(s).to_string())))
            } else {
                Ok(FilterArg::Column(s.clone()))
            }
        }
        Json::Number(n) => Ok(FilterArg::Value(number_value(n)?)),
        Json::Bool(b) => Ok(FilterArg::Value(Value::Bool(*b))),
        Json::Null => Ok(FilterArg::Value(Value::Null)),
        Json::Array(items) => {
            let values = items.iter().map(list_element).collect::<Result<_>>()?;
            Ok(FilterArg::List(values))
        }
        Json::Object(_) => {
            if op != Comparator::In {
                return Err(Error::bad_request(format!(
                    "sub-query arguments are only valid with 'in', was: {arg}"
                )));
            }
            let node: QueryNode = serde_json::from_value(arg.clone())
                .map_err(|e| Error::bad_request(format!("malformed sub-query: {e}")))?;
            Ok(FilterArg::SubQuery(Box::new(node)))
        }
    }
}

/// Elements of an `in` list are literals; strings may be quoted or bare.
fn list_element(item: &Json) -> Result<Value> {
    match item {
        Json::String(s) => {
            if is_quoted(s) {
                Ok(Value::Str(trim_quotes(s).to_string()))
            } else {
                Ok(Value::Str(s.clone()))
            }
        }
        Json::Number(n) => number_value(n),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        other => Err(Error::bad_request(format!(
            "invalid element in filter list: {other}"
        ))),
    }
}

fn number_value(n: &serde_json::Number) -> Result<Value> {
    if let Some(i) = n.as_i64() {
        Ok(Value::Int(i))
    } else if let Some(f) = n.as_f64() {
        Ok(Value::Float(f))
    } else {
        Err(Error::bad_request(format!("unrepresentable number: {n}")))
    }
}

// == Resolve ==
impl FilterNode {
    /// Resolves sub-queries against `frame`, yielding the clause tree the
    /// frame library applies. The sub-query runs over the same frame the
    /// enclosing filter was given; its result must contain the filter column,
    /// whose values become the membership list.
    pub fn resolve(&self, frame: &Frame) -> Result<Clause> {
        match self {
            FilterNode::Null => Ok(Clause::Null),
            FilterNode::And(children) => Ok(Clause::And(resolve_children(children, frame)?)),
            FilterNode::Or(children) => Ok(Clause::Or(resolve_children(children, frame)?)),
            FilterNode::Not(child) => Ok(Clause::Not(Box::new(child.resolve(frame)?))),
            FilterNode::Cmp { op, column, arg } => {
                let arg = match arg {
                    FilterArg::Value(v) => CmpArg::Value(v.clone()),
                    FilterArg::Column(c) => CmpArg::Column(c.clone()),
                    FilterArg::List(vs) => CmpArg::List(vs.clone()),
                    FilterArg::SubQuery(node) => {
                        let result = node.eval(frame)?;
                        let col = result.frame.column(column).ok_or_else(|| {
                            Error::bad_request(format!(
                                "sub-query result does not contain column {column}"
                            ))
                        })?;
                        let values = (0..col.len())
                            .map(|i| col.value(i))
                            .filter(|v| *v != Value::Null)
                            .collect();
                        CmpArg::List(values)
                    }
                };
                Ok(Clause::Cmp {
                    op: *op,
                    column: column.clone(),
                    arg,
                })
            }
        }
    }
}

fn resolve_children(children: &[FilterNode], frame: &Frame) -> Result<Vec<Clause>> {
    children.iter().map(|c| c.resolve(frame)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(input: serde_json::Value) -> Result<FilterNode> {
        parse_filter(Some(&input))
    }

    #[test]
    fn test_parse_comparison() {
        let node = parse(json!([">", "I", 199])).unwrap();
        let FilterNode::Cmp { op, column, arg } = node else {
            panic!("expected comparison");
        };
        assert_eq!(op, Comparator::Gt);
        assert_eq!(column, "I");
        assert!(matches!(arg, FilterArg::Value(Value::Int(199))));
    }

    #[test]
    fn test_parse_quoted_string_is_literal() {
        let node = parse(json!(["=", "S", "'abc'"])).unwrap();
        let FilterNode::Cmp { arg, .. } = node else {
            panic!("expected comparison");
        };
        assert!(matches!(arg, FilterArg::Value(Value::Str(ref s)) if s == "abc"));
    }

    #[test]
    fn test_parse_bare_string_is_column_reference() {
        let node = parse(json!(["=", "S", "T"])).unwrap();
        let FilterNode::Cmp { arg, .. } = node else {
            panic!("expected comparison");
        };
        assert!(matches!(arg, FilterArg::Column(ref c) if c == "T"));
    }

    #[test]
    fn test_parse_nary_and_unary() {
        assert!(matches!(
            parse(json!(["&", [">", "I", 1], ["<", "I", 10]])).unwrap(),
            FilterNode::And(ref c) if c.len() == 2
        ));
        assert!(matches!(
            parse(json!(["!", ["=", "I", 1]])).unwrap(),
            FilterNode::Not(_)
        ));
        // Word forms are accepted too
        assert!(matches!(
            parse(json!(["or", [">", "I", 1], ["<", "I", 0]])).unwrap(),
            FilterNode::Or(_)
        ));
    }

    #[test]
    fn test_missing_filter_is_identity() {
        assert!(matches!(parse_filter(None).unwrap(), FilterNode::Null));
        assert!(matches!(parse(json!(null)).unwrap(), FilterNode::Null));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(json!("not a list")).is_err());
        assert!(parse(json!([">", "I"])).is_err());
        assert!(parse(json!([">", "I", 1, 2])).is_err());
        assert!(parse(json!([5, "I", 1])).is_err());
        assert!(parse(json!(["&", [">", "I", 1]])).is_err());
        assert!(parse(json!(["!", ["=", "I", 1], ["=", "I", 2]])).is_err());
        assert!(parse(json!(["><", "I", 1])).is_err());
        assert!(parse(json!(["=", 42, 1])).is_err());
    }

    #[test]
    fn test_sub_query_only_valid_for_in() {
        assert!(parse(json!(["in", "I", {"where": [">", "I", 1]}])).is_ok());
        assert!(parse(json!(["=", "I", {"where": [">", "I", 1]}])).is_err());
    }

    #[test]
    fn test_in_list_strings_accept_both_quotings() {
        let node = parse(json!(["in", "S", ["a", "'b'"]])).unwrap();
        let FilterNode::Cmp { arg: FilterArg::List(values), .. } = node else {
            panic!("expected list");
        };
        assert_eq!(
            values,
            vec![Value::Str("a".to_string()), Value::Str("b".to_string())]
        );
    }
}
