//! Registry models

use super::value::SqlValue;
use serde::{Deserialize, Serialize};

/// Parent pointer of a root cohort
pub const NO_PARENT: i64 = -1;

/// A persisted cohort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    pub id: i64,
    pub name: String,
    pub is_initial: i64,
    pub previous_cohort: i64,
    pub entity_database: String,
    pub entity_schema: String,
    pub entity_table: String,
    pub statement: String,
    pub parameters: Vec<SqlValue>,
}

/// A cohort composed but not yet stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewCohort {
    pub name: String,
    pub is_initial: i64,
    pub previous_cohort: i64,
    pub entity_database: String,
    pub entity_schema: String,
    pub entity_table: String,
    pub statement: String,
    pub parameters: Vec<SqlValue>,
    /// Entity ids recorded in `cohort_entity`; empty for filter-derived cohorts
    pub members: Vec<String>,
}

/// Cohort row without its statement, as listed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CohortSummary {
    pub id: i64,
    pub name: String,
    pub is_initial: i64,
    pub previous_cohort: i64,
    pub entity_database: String,
    pub entity_schema: String,
    pub entity_table: String,
}

impl From<&Cohort> for CohortSummary {
    fn from(c: &Cohort) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            is_initial: c.is_initial,
            previous_cohort: c.previous_cohort,
            entity_database: c.entity_database.clone(),
            entity_schema: c.entity_schema.clone(),
            entity_table: c.entity_table.clone(),
        }
    }
}
