//! # Coral Common Library
//!
//! Shared code for the Coral cohort service:
//! - Error taxonomy
//! - Bootstrap configuration loading
//! - Connection pools for the entity databases and the cohort registry
//! - Registry schema and persisted models

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
