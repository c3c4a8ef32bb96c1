//! Cohort registry initialization
//!
//! Creates the registry tables on first run. Idempotent, safe to call on every startup.

use crate::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Create the registry tables if needed
pub async fn init_registry(pool: &SqlitePool) -> Result<()> {
    create_cohort_table(pool).await?;
    create_cohort_entity_table(pool).await?;
    info!("Cohort registry schema ready");
    Ok(())
}

/// One row per cohort; `statement` plus `parameters` reproduce the row set standalone
pub async fn create_cohort_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cohort (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            is_initial INTEGER NOT NULL CHECK (is_initial IN (0, 1)),
            previous_cohort INTEGER NOT NULL,
            entity_database TEXT NOT NULL,
            entity_schema TEXT NOT NULL,
            entity_table TEXT NOT NULL,
            statement TEXT NOT NULL,
            parameters TEXT NOT NULL DEFAULT '[]',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (previous_cohort <> id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cohort_previous ON cohort(previous_cohort)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Explicit entity membership of cohorts materialized from clustering
pub async fn create_cohort_entity_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cohort_entity (
            cohort_id INTEGER NOT NULL REFERENCES cohort(id) ON DELETE CASCADE,
            entity_id TEXT NOT NULL,
            PRIMARY KEY (cohort_id, entity_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
