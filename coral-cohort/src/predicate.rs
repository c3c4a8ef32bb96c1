//! Predicate builder
//!
//! Turns the textual value lists and range descriptors of filter requests into boolean
//! [`Expr`] trees over a target expression. Pure functions; nothing here touches a database.

use crate::sql::{BinaryOp, Expr};
use coral_common::db::SqlValue;
use coral_common::{Error, Result};

/// Separator between entries of a multi-value parameter (`values`, `agent`, `cohortIds`)
pub const VALUE_LIST_DELIMITER: &str = "&#x2e31;";

/// Marker selecting rows whose value is NULL
pub const NULL_MARKER: &str = "null";

/// Marker selecting rows whose value is not NULL
pub const NOT_NULL_MARKER: &str = "!null";

/// How the entries of a value list are typed when bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Number,
    Boolean,
}

impl ValueKind {
    /// Map the `numeric` request flag
    pub fn from_numeric_flag(numeric: bool) -> Self {
        if numeric {
            ValueKind::Number
        } else {
            ValueKind::Text
        }
    }

    /// Type one token
    pub fn parse(self, token: &str) -> Result<SqlValue> {
        match self {
            ValueKind::Text => Ok(SqlValue::Text(token.to_string())),
            ValueKind::Number => parse_number(token)
                .ok_or_else(|| Error::InvalidFilterValue(format!("'{}' is not a number", token))),
            ValueKind::Boolean => parse_flag(token)
                .map(SqlValue::Bool)
                .map_err(|_| Error::InvalidFilterValue(format!("'{}' is not a boolean", token))),
        }
    }
}

/// Parse an integer, falling back to a finite float
pub fn parse_number(token: &str) -> Option<SqlValue> {
    let token = token.trim();
    if let Ok(i) = token.parse::<i64>() {
        return Some(SqlValue::Integer(i));
    }
    token
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(SqlValue::Real)
}

/// Parse a `true`/`false` request flag, case-insensitively
pub fn parse_flag(token: &str) -> Result<bool> {
    match token.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::InvalidFilterValue(format!(
            "expected 'true' or 'false', got '{}'",
            token
        ))),
    }
}

/// One classified entry of a value list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueToken {
    Null,
    NotNull,
    Exclude(String),
    Include(String),
}

/// Split a value list and classify each entry
pub fn tokenize(values: &str) -> Vec<ValueToken> {
    values
        .split(VALUE_LIST_DELIMITER)
        .map(|token| match token {
            NULL_MARKER => ValueToken::Null,
            NOT_NULL_MARKER => ValueToken::NotNull,
            t => match t.strip_prefix('!') {
                Some(rest) => ValueToken::Exclude(rest.to_string()),
                None => ValueToken::Include(t.to_string()),
            },
        })
        .collect()
}

/// Parsed form of an equals filter
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EqualsSpec {
    pub include: Vec<SqlValue>,
    pub exclude: Vec<SqlValue>,
    pub null: bool,
    pub not_null: bool,
}

impl EqualsSpec {
    /// Classify and type a delimited value list
    pub fn parse(values: &str, kind: ValueKind) -> Result<Self> {
        let mut spec = EqualsSpec::default();
        for token in tokenize(values) {
            match token {
                ValueToken::Null => spec.null = true,
                ValueToken::NotNull => spec.not_null = true,
                ValueToken::Exclude(v) => spec.exclude.push(kind.parse(&v)?),
                ValueToken::Include(v) => spec.include.push(kind.parse(&v)?),
            }
        }
        Ok(spec)
    }

    /// Build the predicate over `target`
    ///
    /// Inclusion and exclusion lists are AND-ed. A `null` marker OR-s in `IS NULL` and wins
    /// over `!null`; a lone `!null` AND-s in `IS NOT NULL`, including when both lists are
    /// present.
    pub fn to_expr(&self, target: &Expr) -> Expr {
        let mut lists = Vec::new();
        if !self.include.is_empty() {
            lists.push(target.clone().in_list(values(&self.include), false));
        }
        if !self.exclude.is_empty() {
            lists.push(target.clone().in_list(values(&self.exclude), true));
        }

        let null_clause = if self.null {
            Some(target.clone().is_null(false))
        } else if self.not_null {
            Some(target.clone().is_null(true))
        } else {
            None
        };

        match (lists.is_empty(), null_clause) {
            (true, Some(null_clause)) => null_clause,
            (true, None) => Expr::Or(Vec::new()),
            (false, None) => Expr::all(lists),
            (false, Some(null_clause)) => {
                let lists = Expr::all(lists);
                if self.null {
                    Expr::Or(vec![lists, null_clause])
                } else {
                    Expr::And(vec![lists, null_clause])
                }
            }
        }
    }
}

fn values(list: &[SqlValue]) -> Vec<Expr> {
    list.iter().cloned().map(Expr::Value).collect()
}

/// Build an equals predicate from a delimited value list
pub fn equals_predicate(target: &Expr, values: &str, kind: ValueKind) -> Result<Expr> {
    Ok(EqualsSpec::parse(values, kind)?.to_expr(target))
}

/// Comparison operator of a range bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl RangeOp {
    fn parse(op: &str) -> Option<Self> {
        match op.to_ascii_lowercase().as_str() {
            "lt" => Some(RangeOp::Lt),
            "lte" => Some(RangeOp::Lte),
            "gt" => Some(RangeOp::Gt),
            "gte" => Some(RangeOp::Gte),
            _ => None,
        }
    }

    fn binary_op(self) -> BinaryOp {
        match self {
            RangeOp::Lt => BinaryOp::Lt,
            RangeOp::Lte => BinaryOp::Lte,
            RangeOp::Gt => BinaryOp::Gt,
            RangeOp::Gte => BinaryOp::Gte,
        }
    }
}

/// One `;`-separated range: a conjunction of bounds, or the null bucket
#[derive(Debug, Clone, PartialEq)]
pub enum Range {
    Null,
    Bounds(Vec<(RangeOp, SqlValue)>),
}

/// Parse `gt_2%lte_5;gte_10` style range lists
pub fn parse_ranges(ranges: &str) -> Result<Vec<Range>> {
    ranges.split(';').map(parse_range).collect()
}

fn parse_range(range: &str) -> Result<Range> {
    let mut bounds = Vec::new();
    let mut null = false;
    for bound in range.split('%') {
        let parts: Vec<&str> = bound.split('_').collect();
        let [op, value] = parts.as_slice() else {
            return Err(Error::InvalidRange(format!(
                "'{}' is not of the form <op>_<value>",
                bound
            )));
        };
        if *value == NULL_MARKER {
            null = true;
            continue;
        }
        let op = RangeOp::parse(op)
            .ok_or_else(|| Error::InvalidRange(format!("unknown operator '{}'", op)))?;
        let value = parse_number(value)
            .ok_or_else(|| Error::InvalidRange(format!("'{}' is not a number", value)))?;
        bounds.push((op, value));
    }
    Ok(if null { Range::Null } else { Range::Bounds(bounds) })
}

/// OR-combination of the ranges over `target`
pub fn ranges_to_expr(ranges: &[Range], target: &Expr) -> Expr {
    Expr::any(
        ranges
            .iter()
            .map(|range| match range {
                Range::Null => target.clone().is_null(false),
                Range::Bounds(bounds) => Expr::all(
                    bounds
                        .iter()
                        .map(|(op, v)| target.clone().binary(op.binary_op(), Expr::Value(v.clone())))
                        .collect(),
                ),
            })
            .collect(),
    )
}

/// Build a numeric-range predicate from a range list
pub fn range_predicate(target: &Expr, ranges: &str) -> Result<Expr> {
    Ok(ranges_to_expr(&parse_ranges(ranges)?, target))
}
