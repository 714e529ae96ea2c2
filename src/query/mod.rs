//! Query Module
//!
//! Parses a JSON query into a typed tree and evaluates it against a frame.
//! The evaluation order is fixed: from, filter, group/aggregate, distinct,
//! order by, aliases, projection, then slicing. `unsliced_len` records the
//! row count just before the slice so clients can page.

mod filter;
mod literal;
mod select;

use serde::Deserialize;
use serde_json::Value as Json;

pub use filter::{parse_filter, FilterArg, FilterNode};
pub use literal::{is_quoted, string_expr, trim_quotes};
pub use select::{parse_expr, parse_select, Alias, SelectClause};

use crate::error::{Error, Result};
use crate::frame::{Frame, SortKey};

// == Query Node ==
/// One level of a query; `from` nests another level evaluated first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryNode {
    #[serde(default)]
    pub select: Option<Json>,
    #[serde(default, rename = "where")]
    pub filter: Option<Json>,
    #[serde(default)]
    pub order_by: Vec<String>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub distinct: Vec<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub from: Option<Box<QueryNode>>,
}

// == Query Result ==
#[derive(Debug)]
pub struct QueryResult {
    pub frame: Frame,
    /// Row count before offset/limit were applied.
    pub unsliced_len: usize,
}

/// Parses and evaluates a JSON query against `frame`.
pub fn query(frame: &Frame, query_string: &str) -> Result<QueryResult> {
    let node: QueryNode = serde_json::from_str(query_string)
        .map_err(|e| Error::bad_request(format!("malformed query: {e}")))?;
    node.eval(frame)
}

impl QueryNode {
    pub fn eval(&self, frame: &Frame) -> Result<QueryResult> {
        let source;
        let input = match &self.from {
            Some(from) => {
                source = from.eval(frame)?.frame;
                &source
            }
            None => frame,
        };

        if !self.group_by.is_empty() && !self.distinct.is_empty() {
            return Err(Error::bad_request(
                "cannot combine group by and distinct in the same query",
            ));
        }

        let filter = parse_filter(self.filter.as_ref())?;
        let select = parse_select(self.select.as_ref())?;

        let clause = filter.resolve(input)?;
        let mut result = input.filter(&clause)?;

        if !self.group_by.is_empty() || !select.aggregations.is_empty() {
            let grouper = result.group_by(&self.group_by)?;
            result = grouper.aggregate(&select.aggregations)?;
        }

        if !self.distinct.is_empty() {
            result = result.distinct(&self.distinct)?;
        }

        result = result.sort(&order_by_keys(&self.order_by))?;

        for alias in &select.aliases {
            result = result.eval(&alias.dst, &alias.expr)?;
        }

        if !select.columns.is_empty() {
            result = result.select(&select.columns)?;
        }

        let unsliced_len = result.len();
        let stop = if self.limit > 0 {
            unsliced_len.min(self.offset + self.limit)
        } else {
            unsliced_len
        };
        let frame = result.slice(self.offset, stop);

        Ok(QueryResult { frame, unsliced_len })
    }
}

/// `order_by` entries are column names; a `-` prefix means descending.
fn order_by_keys(order_by: &[String]) -> Vec<SortKey> {
    order_by
        .iter()
        .map(|entry| match entry.strip_prefix('-') {
            Some(column) => SortKey {
                column: column.to_string(),
                reverse: true,
            },
            None => SortKey {
                column: entry.clone(),
                reverse: false,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Column;

    fn int_frame(rows: &[(i64, i64)]) -> Frame {
        Frame::new(vec![
            (
                "I".to_string(),
                Column::Int(rows.iter().map(|(a, _)| Some(*a)).collect()),
            ),
            (
                "I2".to_string(),
                Column::Int(rows.iter().map(|(_, b)| Some(*b)).collect()),
            ),
        ])
        .unwrap()
    }

    fn grouped_frame() -> Frame {
        Frame::new(vec![
            (
                "S".to_string(),
                Column::Str(
                    ["A", "C", "A", "A"]
                        .iter()
                        .map(|s| Some(s.to_string()))
                        .collect(),
                ),
            ),
            (
                "I".to_string(),
                Column::Int(vec![Some(2), Some(1), Some(1), Some(2)]),
            ),
        ])
        .unwrap()
    }

    fn ints(frame: &Frame, col: &str) -> Vec<i64> {
        let Column::Int(v) = frame.column(col).unwrap() else {
            panic!("not an int column");
        };
        v.iter().map(|x| x.unwrap()).collect()
    }

    #[test]
    fn test_empty_query_is_identity() {
        let f = int_frame(&[(1, 2), (3, 4)]);
        let result = query(&f, "{}").unwrap();
        assert_eq!(result.frame, f);
        assert_eq!(result.unsliced_len, 2);
    }

    #[test]
    fn test_malformed_json() {
        let f = int_frame(&[(1, 2)]);
        assert!(query(&f, "{not json").is_err());
    }

    #[test]
    fn test_filter_with_nested_clauses() {
        let f = int_frame(&[(123, 124), (200, 124), (223, 124)]);
        let result = query(
            &f,
            r#"{"where": ["&", [">", "I", 199], ["|", [">", "I", 199], ["<", "I", 20]]]}"#,
        )
        .unwrap();
        assert_eq!(ints(&result.frame, "I"), vec![200, 223]);
    }

    #[test]
    fn test_group_by_aggregation() {
        let result = query(
            &grouped_frame(),
            r#"{"select": ["S", ["sum", "I"]], "group_by": ["S"], "order_by": ["S"]}"#,
        )
        .unwrap();
        assert_eq!(result.frame.len(), 2);
        assert_eq!(ints(&result.frame, "I"), vec![5, 1]);
    }

    #[test]
    fn test_aggregation_without_group_by_is_global() {
        let result = query(&grouped_frame(), r#"{"select": [["sum", "I"]]}"#).unwrap();
        assert_eq!(ints(&result.frame, "I"), vec![6]);
    }

    #[test]
    fn test_group_by_and_distinct_incompatible() {
        let err = query(
            &grouped_frame(),
            r#"{"group_by": ["S"], "distinct": ["I"]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot combine"));
    }

    #[test]
    fn test_distinct() {
        let result = query(&grouped_frame(), r#"{"distinct": ["S"]}"#).unwrap();
        assert_eq!(result.frame.len(), 2);
    }

    #[test]
    fn test_order_by_descending_prefix() {
        let f = int_frame(&[(1, 0), (3, 0), (2, 0)]);
        let result = query(&f, r#"{"order_by": ["-I"]}"#).unwrap();
        assert_eq!(ints(&result.frame, "I"), vec![3, 2, 1]);
    }

    #[test]
    fn test_order_by_unknown_column() {
        let f = int_frame(&[(1, 0)]);
        assert!(query(&f, r#"{"order_by": ["missing"]}"#).is_err());
    }

    #[test]
    fn test_projection_order() {
        let f = int_frame(&[(1, 2)]);
        let result = query(&f, r#"{"select": ["I2", "I"]}"#).unwrap();
        let names: Vec<&str> = result.frame.column_names().collect();
        assert_eq!(names, vec!["I2", "I"]);
    }

    #[test]
    fn test_unknown_projection_column() {
        let f = int_frame(&[(1, 2)]);
        assert!(query(&f, r#"{"select": ["missing"]}"#).is_err());
    }

    #[test]
    fn test_alias_expression() {
        let f = int_frame(&[(1, 10), (2, 20)]);
        let result = query(
            &f,
            r#"{"select": ["I", ["=", "sum2", ["+", "I", "I2"]]]}"#,
        )
        .unwrap();
        assert_eq!(ints(&result.frame, "sum2"), vec![11, 22]);
        let names: Vec<&str> = result.frame.column_names().collect();
        assert_eq!(names, vec!["I", "sum2"]);
    }

    #[test]
    fn test_slice_and_unsliced_len() {
        let f = int_frame(&[(1, 0), (2, 0), (3, 0), (4, 0), (5, 0)]);
        let result = query(&f, r#"{"offset": 1, "limit": 2, "order_by": ["I"]}"#).unwrap();
        assert_eq!(ints(&result.frame, "I"), vec![2, 3]);
        assert_eq!(result.unsliced_len, 5);

        // Without limit the slice runs to the end
        let result = query(&f, r#"{"offset": 3}"#).unwrap();
        assert_eq!(ints(&result.frame, "I"), vec![4, 5]);
        assert_eq!(result.unsliced_len, 5);
    }

    #[test]
    fn test_negative_offset_rejected() {
        let f = int_frame(&[(1, 0)]);
        assert!(query(&f, r#"{"offset": -1}"#).is_err());
        assert!(query(&f, r#"{"limit": -5}"#).is_err());
    }

    #[test]
    fn test_from_sub_query() {
        let f = int_frame(&[(1, 0), (2, 0), (3, 0), (4, 0)]);
        let result = query(
            &f,
            r#"{"where": ["<", "I", 4], "from": {"where": [">", "I", 1]}}"#,
        )
        .unwrap();
        assert_eq!(ints(&result.frame, "I"), vec![2, 3]);
    }

    #[test]
    fn test_in_with_literal_list() {
        let f = int_frame(&[(1, 0), (2, 0), (3, 0)]);
        let result = query(&f, r#"{"where": ["in", "I", [1, 3]]}"#).unwrap();
        assert_eq!(ints(&result.frame, "I"), vec![1, 3]);
    }

    #[test]
    fn test_in_with_sub_query() {
        let f = int_frame(&[(1, 10), (2, 20), (3, 30)]);
        let result = query(
            &f,
            r#"{"where": ["in", "I", {"select": ["I"], "where": [">", "I2", 15]}]}"#,
        )
        .unwrap();
        assert_eq!(ints(&result.frame, "I"), vec![2, 3]);
    }

    #[test]
    fn test_in_sub_query_without_column_errors() {
        let f = int_frame(&[(1, 10)]);
        let err = query(
            &f,
            r#"{"where": ["in", "I", {"select": ["I2"]}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("does not contain column"));
    }

    #[test]
    fn test_unsliced_len_equals_len_without_slicing() {
        let f = int_frame(&[(1, 0), (2, 0), (3, 0)]);
        let result = query(&f, r#"{"where": [">", "I", 1]}"#).unwrap();
        assert_eq!(result.unsliced_len, result.frame.len());
    }
}
