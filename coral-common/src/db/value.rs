//! Typed SQL parameter values and row conversion

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, ValueRef};

/// A literal bound to a `?` placeholder
///
/// Persisted alongside cohort statements as a JSON array, in placeholder order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
}

impl SqlValue {
    /// Bind this value onto a query
    pub fn bind_to<'q>(
        &self,
        query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        match self {
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Integer(i) => query.bind(*i),
            SqlValue::Real(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(*b),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Integer(i)
    }
}

impl From<f64> for SqlValue {
    fn from(f: f64) -> Self {
        SqlValue::Real(f)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

/// Bind a parameter list onto a query, in order
pub fn bind_all<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlValue],
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    params.iter().fold(query, |q, value| value.bind_to(q))
}

/// Convert a single column of a row to JSON
///
/// SQLite storage classes map to JSON strings, integers and floats; NULL and BLOB map to null.
pub fn column_to_json(row: &SqliteRow, index: usize) -> serde_json::Value {
    row.try_get_raw(index)
        .ok()
        .and_then(|val| {
            if val.is_null() {
                Some(serde_json::Value::Null)
            } else {
                row.try_get::<String, _>(index)
                    .ok()
                    .map(serde_json::Value::String)
                    .or_else(|| row.try_get::<i64, _>(index).ok().map(|v| json!(v)))
                    .or_else(|| row.try_get::<f64, _>(index).ok().map(|v| json!(v)))
            }
        })
        .unwrap_or(serde_json::Value::Null)
}

/// Convert a row to a JSON object keyed by column name
pub fn row_to_json(row: &SqliteRow) -> serde_json::Map<String, serde_json::Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| (col.name().to_string(), column_to_json(row, i)))
        .collect()
}
