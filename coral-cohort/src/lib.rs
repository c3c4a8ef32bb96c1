//! # Coral Cohort Core
//!
//! Cohort derivation over entity tables:
//! - Parameterized SQL expression tree and renderer (`sql`)
//! - Predicate builder for equals and numeric-range filters (`predicate`)
//! - Statement composer nesting each cohort over its parent (`composer`)
//! - Cohort registry persistence (`repository`)
//! - Histogram queries and bin reconciliation (`histogram`)
//! - Cluster-split advisor (`cluster`)
//! - Operation facade used by the HTTP layer (`service`)

pub mod cluster;
pub mod composer;
pub mod entity;
pub mod executor;
pub mod filter;
pub mod histogram;
pub mod params;
pub mod predicate;
pub mod repository;
pub mod service;
pub mod sql;

pub use composer::Composer;
pub use filter::{FilterKind, FilterSpec};
pub use histogram::{Histogram, HistogramKind};
pub use params::Params;
pub use repository::CohortRepository;
pub use service::{CohortService, SplitRecommendation};
