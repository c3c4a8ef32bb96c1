//! HTTP API handlers for coral-server

pub mod buildinfo;
pub mod cohorts;
pub mod error;
pub mod health;

pub use buildinfo::get_build_info;
pub use error::ApiError;
pub use health::health_routes;
