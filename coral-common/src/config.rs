//! Bootstrap configuration loading
//!
//! Configuration file resolution follows this priority order:
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`CORAL_CONFIG`)
//! 3. Platform config file (`<config dir>/coral/config.toml`, then `/etc/coral/config.toml`)
//! 4. Built-in defaults
//!
//! An explicitly requested file (1 or 2) must exist. A missing platform file is
//! not an error; the service starts on built-in defaults and logs a warning.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "CORAL_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Bind address of the HTTP server
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database holding the `cohort` and `cohort_entity` tables
    #[serde(default = "default_registry")]
    pub registry: DatabaseConfig,

    /// Entity databases, addressed by `name` from `cohort.entity_database`
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub histogram: HistogramConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One SQLite database plus the schemas attached to each of its connections
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub attach: Vec<AttachConfig>,
}

/// A database file attached under a schema name (`tissue`, `cellline`, `public`, ...)
#[derive(Debug, Clone, Deserialize)]
pub struct AttachConfig {
    pub schema: String,
    pub path: PathBuf,
}

/// Connection pool sizing and statement timeouts
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_pool_size")]
    pub size: u32,

    /// Timeout for cohort-mutation and data queries
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,

    /// Timeout for supplemental queries (histograms)
    #[serde(default = "default_supp_statement_timeout_ms")]
    pub supp_statement_timeout_ms: u64,

    /// SQLite busy handler timeout
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Gene catalog joined by gene-score queries
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_schema")]
    pub schema: String,
    #[serde(default = "default_catalog_table")]
    pub table: String,
    #[serde(default = "default_species")]
    pub species: String,
}

/// Cluster-split advisor limits
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Largest population accepted for clustering
    #[serde(default = "default_max_points")]
    pub max_points: usize,

    /// Upper end (exclusive) of the elbow search range
    #[serde(default = "default_max_k")]
    pub max_k: usize,

    #[serde(default = "default_elbow_threshold")]
    pub elbow_threshold: f64,

    /// HDBSCAN minimum cluster size as a fraction of the population
    #[serde(default = "default_min_cluster_fraction")]
    pub min_cluster_fraction: f64,

    /// Seed for centroid initialization
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistogramConfig {
    #[serde(default = "default_bins")]
    pub bins: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9066
}

fn default_registry() -> DatabaseConfig {
    DatabaseConfig {
        name: "cohort".to_string(),
        path: default_data_folder().join("cohort.db"),
        attach: Vec::new(),
    }
}

fn default_pool_size() -> u32 {
    8
}

fn default_statement_timeout_ms() -> u64 {
    300_000
}

fn default_supp_statement_timeout_ms() -> u64 {
    40_000
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_catalog_schema() -> String {
    "public".to_string()
}

fn default_catalog_table() -> String {
    "tdp_gene".to_string()
}

fn default_species() -> String {
    "human".to_string()
}

fn default_max_points() -> usize {
    50_000
}

fn default_max_k() -> usize {
    60
}

fn default_elbow_threshold() -> f64 {
    0.1
}

fn default_min_cluster_fraction() -> f64 {
    0.05
}

fn default_seed() -> u64 {
    42
}

fn default_bins() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            registry: default_registry(),
            databases: Vec::new(),
            pool: PoolConfig::default(),
            catalog: CatalogConfig::default(),
            cluster: ClusterConfig::default(),
            histogram: HistogramConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            statement_timeout_ms: default_statement_timeout_ms(),
            supp_statement_timeout_ms: default_supp_statement_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            schema: default_catalog_schema(),
            table: default_catalog_table(),
            species: default_species(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            max_points: default_max_points(),
            max_k: default_max_k(),
            elbow_threshold: default_elbow_threshold(),
            min_cluster_fraction: default_min_cluster_fraction(),
            seed: default_seed(),
        }
    }
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self { bins: default_bins() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the configuration file and load it
    ///
    /// Returns the configuration together with the file it came from, if any.
    pub async fn load(cli_path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let Some(path) = resolve_config_path(cli_path)? else {
            warn!("No configuration file found, using built-in defaults");
            return Ok((Self::default(), None));
        };

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;

        info!("Loaded configuration from {}", path.display());
        Ok((config, Some(path)))
    }

    /// Look up an entity database by name
    pub fn database(&self, name: &str) -> Option<&DatabaseConfig> {
        self.databases.iter().find(|db| db.name == name)
    }

    fn validate(&self) -> Result<()> {
        if self.pool.size == 0 {
            return Err(Error::Config("pool.size must be at least 1".to_string()));
        }
        if self.histogram.bins == 0 {
            return Err(Error::Config("histogram.bins must be at least 1".to_string()));
        }
        if self.cluster.max_k < 3 {
            return Err(Error::Config("cluster.max_k must be at least 3".to_string()));
        }
        if !(self.cluster.min_cluster_fraction > 0.0 && self.cluster.min_cluster_fraction < 1.0) {
            return Err(Error::Config(
                "cluster.min_cluster_fraction must lie in (0, 1)".to_string(),
            ));
        }

        let mut names: Vec<&str> = self.databases.iter().map(|db| db.name.as_str()).collect();
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(Error::Config(format!("Duplicate database name: {}", dup[0])));
        }

        for db in std::iter::once(&self.registry).chain(self.databases.iter()) {
            for attach in &db.attach {
                if !crate::db::is_valid_identifier(&attach.schema) {
                    return Err(Error::Config(format!(
                        "Invalid schema name '{}' attached to database '{}'",
                        attach.schema, db.name
                    )));
                }
            }
        }
        for ident in [&self.catalog.schema, &self.catalog.table] {
            if !crate::db::is_valid_identifier(ident) {
                return Err(Error::Config(format!("Invalid catalog identifier '{}'", ident)));
            }
        }

        Ok(())
    }
}

/// Determine which configuration file to read
///
/// `Ok(None)` means no file was requested and none exists at the platform locations.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return require_file(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return require_file(PathBuf::from(path));
        }
    }

    // Priority 3: platform config files
    let user_config = dirs::config_dir().map(|d| d.join("coral").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(Some(path));
        }
    }
    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/coral/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }
    }

    Ok(None)
}

fn require_file(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.is_file() {
        Ok(Some(path))
    } else {
        Err(Error::Config(format!("Config file not found: {}", path.display())))
    }
}

/// Get OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("coral"))
        .unwrap_or_else(|| PathBuf::from("./coral_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9066);
        assert_eq!(config.pool.size, 8);
        assert_eq!(config.pool.statement_timeout_ms, 300_000);
        assert_eq!(config.pool.supp_statement_timeout_ms, 40_000);
        assert_eq!(config.catalog.species, "human");
        assert_eq!(config.cluster.max_k, 60);
        assert_eq!(config.histogram.bins, 10);
        assert_eq!(config.logging.level, "info");
        assert!(config.databases.is_empty());
        assert_eq!(config.registry.name, "cohort");
    }

    #[test]
    fn test_databases_with_attached_schemas() {
        let config = TomlConfig::from_toml_str(
            r#"
            port = 9100

            [registry]
            name = "cohort"
            path = "/data/cohort.db"

            [[databases]]
            name = "publicdb"
            path = "/data/main.db"
            attach = [
                { schema = "tissue", path = "/data/tissue.db" },
                { schema = "public", path = "/data/public.db" },
            ]

            [pool]
            supp_statement_timeout_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9100);
        let db = config.database("publicdb").unwrap();
        assert_eq!(db.attach.len(), 2);
        assert_eq!(db.attach[0].schema, "tissue");
        assert_eq!(config.pool.supp_statement_timeout_ms, 1000);
        assert_eq!(config.pool.statement_timeout_ms, 300_000);
        assert!(config.database("other").is_none());
    }

    #[test]
    fn test_rejects_invalid_attach_schema() {
        let err = TomlConfig::from_toml_str(
            r#"
            [[databases]]
            name = "publicdb"
            path = "main.db"
            attach = [{ schema = "tis sue", path = "t.db" }]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_duplicate_database_names() {
        let err = TomlConfig::from_toml_str(
            r#"
            [[databases]]
            name = "a"
            path = "a.db"

            [[databases]]
            name = "a"
            path = "b.db"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate database name"));
    }

    #[test]
    fn test_rejects_zero_bins() {
        assert!(TomlConfig::from_toml_str("[histogram]\nbins = 0").is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = resolve_config_path(Some(Path::new("/nonexistent/coral.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
