//! Cohort repository
//!
//! Persists and retrieves cohort rows in the registry database. Multi-statement writes run
//! in one transaction; any failure rolls back, is logged, and is returned to the caller.

use crate::predicate::VALUE_LIST_DELIMITER;
use coral_common::db::{Cohort, CohortSummary, NewCohort, SqlValue, TimedPool};
use coral_common::{Error, Result};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::Transaction;
use sqlx::Row;
use tracing::{debug, error, info};

const SUMMARY_COLUMNS: &str =
    "id, name, is_initial, previous_cohort, entity_database, entity_schema, entity_table";

#[derive(Debug, Clone)]
pub struct CohortRepository {
    pool: TimedPool,
}

impl CohortRepository {
    pub fn new(pool: TimedPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &TimedPool {
        &self.pool
    }

    /// Insert a cohort and its explicit members, returning the new id
    pub async fn insert(&self, cohort: &NewCohort) -> Result<i64> {
        let parameters = encode_parameters(cohort)?;
        let pool = self.pool.pool();

        let result = self
            .pool
            .run(async {
                let mut tx = pool.begin().await?;
                let id = insert_cohort(&mut tx, cohort, &parameters).await?;
                tx.commit().await?;
                Ok(id)
            })
            .await;

        match result {
            Ok(id) => {
                info!(
                    "Created cohort {} '{}' (previous {}, {} member(s))",
                    id,
                    cohort.name,
                    cohort.previous_cohort,
                    cohort.members.len()
                );
                Ok(id)
            }
            Err(e) => {
                error!("Failed to create cohort '{}': {}", cohort.name, e);
                Err(e)
            }
        }
    }

    /// Insert a batch of cohorts in one transaction; either all rows land or none do
    pub async fn insert_all(&self, cohorts: &[NewCohort]) -> Result<Vec<i64>> {
        let encoded = cohorts
            .iter()
            .map(encode_parameters)
            .collect::<Result<Vec<_>>>()?;
        let pool = self.pool.pool();

        let result = self
            .pool
            .run(async {
                let mut tx = pool.begin().await?;
                let mut ids = Vec::with_capacity(cohorts.len());
                for (cohort, parameters) in cohorts.iter().zip(&encoded) {
                    ids.push(insert_cohort(&mut tx, cohort, parameters).await?);
                }
                tx.commit().await?;
                Ok(ids)
            })
            .await;

        match result {
            Ok(ids) => {
                info!("Created {} cohort(s) {:?}", ids.len(), ids);
                Ok(ids)
            }
            Err(e) => {
                error!("Failed to create {} cohort(s), none stored: {}", cohorts.len(), e);
                Err(e)
            }
        }
    }

    /// Fetch one cohort, statement included
    pub async fn get(&self, id: i64) -> Result<Cohort> {
        let row = self
            .pool
            .run(
                sqlx::query(
                    r#"
                    SELECT id, name, is_initial, previous_cohort,
                           entity_database, entity_schema, entity_table,
                           statement, parameters
                    FROM cohort
                    WHERE id = ?
                    "#,
                )
                .bind(id)
                .fetch_optional(self.pool.pool()),
            )
            .await?;

        match row {
            Some(row) => cohort_from_row(&row),
            None => Err(Error::NotFound(format!("cohort {}", id))),
        }
    }

    pub async fn exists(&self, id: i64) -> Result<bool> {
        let found: Option<i64> = self
            .pool
            .run(
                sqlx::query_scalar("SELECT id FROM cohort WHERE id = ?")
                    .bind(id)
                    .fetch_optional(self.pool.pool()),
            )
            .await?;
        Ok(found.is_some())
    }

    /// Rename a cohort and return the updated row
    pub async fn rename(&self, id: i64, name: &str) -> Result<Cohort> {
        let pool = self.pool.pool();
        let updated = self
            .pool
            .run(async {
                let mut tx = pool.begin().await?;
                let affected = sqlx::query("UPDATE cohort SET name = ? WHERE id = ?")
                    .bind(name)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                tx.commit().await?;
                Ok(affected)
            })
            .await
            .map_err(|e| {
                error!("Failed to rename cohort {}: {}", id, e);
                e
            })?;

        if updated == 0 {
            return Err(Error::NotFound(format!("cohort {}", id)));
        }
        info!("Renamed cohort {} to '{}'", id, name);
        self.get(id).await
    }

    /// Cohorts for a delimited id list
    ///
    /// Entries that are not plain digit strings are ignored. A list without any valid id
    /// yields no cohorts.
    pub async fn list_by_ids(&self, ids: &str) -> Result<Vec<CohortSummary>> {
        let ids = parse_id_list(ids);
        if ids.is_empty() {
            debug!("No valid cohort ids in request");
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM cohort WHERE id IN ({}) ORDER BY id",
            SUMMARY_COLUMNS,
            vec!["?"; ids.len()].join(", ")
        );
        let query = ids
            .iter()
            .fold(sqlx::query_as::<_, CohortSummary>(&sql), |q, id| q.bind(*id));
        self.pool.run(query.fetch_all(self.pool.pool())).await
    }

    /// Explicit members recorded for a cohort
    pub async fn members(&self, id: i64) -> Result<Vec<String>> {
        self.pool
            .run(
                sqlx::query_scalar(
                    "SELECT entity_id FROM cohort_entity WHERE cohort_id = ? ORDER BY entity_id",
                )
                .bind(id)
                .fetch_all(self.pool.pool()),
            )
            .await
    }
}

/// Keep the entries made only of ASCII digits
fn parse_id_list(ids: &str) -> Vec<i64> {
    ids.split(VALUE_LIST_DELIMITER)
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|id| id.parse().ok())
        .collect()
}

fn encode_parameters(cohort: &NewCohort) -> Result<String> {
    serde_json::to_string(&cohort.parameters)
        .map_err(|e| Error::Storage(sqlx::Error::Encode(Box::new(e))))
}

/// Cohort row plus its `cohort_entity` rows, inside the caller's transaction
async fn insert_cohort(
    tx: &mut Transaction<'_, Sqlite>,
    cohort: &NewCohort,
    parameters: &str,
) -> std::result::Result<i64, sqlx::Error> {
    let id = sqlx::query(
        r#"
        INSERT INTO cohort (
            name, is_initial, previous_cohort,
            entity_database, entity_schema, entity_table,
            statement, parameters
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&cohort.name)
    .bind(cohort.is_initial)
    .bind(cohort.previous_cohort)
    .bind(&cohort.entity_database)
    .bind(&cohort.entity_schema)
    .bind(&cohort.entity_table)
    .bind(&cohort.statement)
    .bind(parameters)
    .execute(&mut **tx)
    .await?
    .last_insert_rowid();

    for entity_id in &cohort.members {
        sqlx::query("INSERT OR IGNORE INTO cohort_entity (cohort_id, entity_id) VALUES (?, ?)")
            .bind(id)
            .bind(entity_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(id)
}

fn cohort_from_row(row: &SqliteRow) -> Result<Cohort> {
    let parameters: String = row.try_get("parameters")?;
    let parameters: Vec<SqlValue> = serde_json::from_str(&parameters)
        .map_err(|e| Error::Storage(sqlx::Error::Decode(Box::new(e))))?;
    Ok(Cohort {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        is_initial: row.try_get("is_initial")?,
        previous_cohort: row.try_get("previous_cohort")?,
        entity_database: row.try_get("entity_database")?,
        entity_schema: row.try_get("entity_schema")?,
        entity_table: row.try_get("entity_table")?,
        statement: row.try_get("statement")?,
        parameters,
    })
}
