//! Statement execution against entity databases

use crate::sql::SqlFragment;
use coral_common::db::{bind_all, row_to_json, TimedPool};
use coral_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

/// A result row as a JSON object keyed by column name
pub type JsonRow = serde_json::Map<String, serde_json::Value>;

/// Run a statement and return its rows
pub async fn fetch_rows(pool: &TimedPool, statement: &SqlFragment) -> Result<Vec<SqliteRow>> {
    debug!(
        sql = %statement.sql,
        params = statement.params.len(),
        "Executing statement"
    );
    let query = bind_all(sqlx::query(&statement.sql), &statement.params);
    pool.run(query.fetch_all(pool.pool())).await
}

/// Run a statement and convert every row to JSON
pub async fn fetch_json(pool: &TimedPool, statement: &SqlFragment) -> Result<Vec<JsonRow>> {
    let rows = fetch_rows(pool, statement).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

/// Run a statement returning a single integer in its first column
pub async fn fetch_count(pool: &TimedPool, statement: &SqlFragment) -> Result<i64> {
    debug!(sql = %statement.sql, "Executing count");
    let query = bind_all(sqlx::query(&statement.sql), &statement.params);
    let row = pool.run(query.fetch_one(pool.pool())).await?;
    Ok(row.try_get::<i64, _>(0)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coral_common::db::SqlValue;
    use sqlx::SqlitePool;
    use std::time::Duration;

    async fn pool() -> TimedPool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE t (name TEXT, age INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO t VALUES ('a', 30), ('b', 50), ('c', NULL)")
            .execute(&pool)
            .await
            .unwrap();
        TimedPool::new(pool, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_parameters_are_bound_in_order() {
        let pool = pool().await;
        let stmt = SqlFragment::new(
            "SELECT name FROM t WHERE age > ? AND name <> ?",
            vec![SqlValue::Integer(20), SqlValue::from("b")],
        );
        let rows = fetch_json(&pool, &stmt).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "a");
    }

    #[tokio::test]
    async fn test_count() {
        let pool = pool().await;
        let stmt = SqlFragment::new("SELECT COUNT(*) FROM t WHERE age IS NULL", vec![]);
        assert_eq!(fetch_count(&pool, &stmt).await.unwrap(), 1);
    }
}
