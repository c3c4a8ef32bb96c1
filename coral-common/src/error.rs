//! Common error types for Coral

use thiserror::Error;

/// Common result type for Coral operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the cohort core and the HTTP layer
#[derive(Error, Debug)]
pub enum Error {
    /// A required request parameter is absent
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// Malformed numeric range descriptor
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Malformed filter value, flag or attribute spec
    #[error("Invalid filter value: {0}")]
    InvalidFilterValue(String),

    /// Schema, table or column name outside the accepted identifier alphabet
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Entity table has no known identifier column (or lacks the requested capability)
    #[error("Unsupported entity table: {0}")]
    UnsupportedEntityTable(String),

    /// Requested cohort does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Query exceeded the statement timeout of its pool
    #[error("Statement timed out after {0} ms")]
    StorageTimeout(u64),

    /// Attribute types have no implemented clustering path
    #[error("Unsupported clustering combination: {0}")]
    UnsupportedClusteringCombination(String),

    /// Clustering could not be performed on the given population
    #[error("Clustering error: {0}")]
    Clustering(String),

    /// Background task panicked or was cancelled
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Internal(format!("background task failed: {}", e))
    }
}

impl Error {
    /// True for errors caused by the request rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::MissingParameter(_)
                | Error::InvalidRange(_)
                | Error::InvalidFilterValue(_)
                | Error::InvalidIdentifier(_)
                | Error::UnsupportedEntityTable(_)
                | Error::NotFound(_)
                | Error::UnsupportedClusteringCombination(_)
                | Error::Clustering(_)
        )
    }

    /// Stable machine-readable code used in error responses
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingParameter(_) => "MISSING_PARAMETER",
            Error::InvalidRange(_) => "INVALID_RANGE",
            Error::InvalidFilterValue(_) => "INVALID_FILTER_VALUE",
            Error::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            Error::UnsupportedEntityTable(_) => "UNSUPPORTED_ENTITY_TABLE",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Storage(_) | Error::StorageTimeout(_) => "STORAGE_ERROR",
            Error::UnsupportedClusteringCombination(_) => "UNSUPPORTED_CLUSTERING_COMBINATION",
            Error::Clustering(_) => "CLUSTERING_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }
}
