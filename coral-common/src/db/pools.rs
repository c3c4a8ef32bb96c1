//! Connection pools
//!
//! Every configured database gets two logical pools distinguished by statement timeout:
//! the primary pool for cohort mutations and data reads, and the supplemental pool for
//! interactive queries such as histograms. SQLite has no server-side statement timeout, so
//! each query future is bounded with `tokio::time::timeout` instead.

use crate::config::{DatabaseConfig, PoolConfig};
use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A pool paired with the statement timeout applied to queries run through it
#[derive(Debug, Clone)]
pub struct TimedPool {
    pool: SqlitePool,
    timeout: Duration,
}

impl TimedPool {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Await a database future, failing with `StorageTimeout` once the timeout elapses
    ///
    /// Dropping the future on expiry releases any connection it had checked out.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::StorageTimeout(self.timeout.as_millis() as u64)),
        }
    }
}

/// Primary and supplemental pools of one database
#[derive(Debug, Clone)]
pub struct DatabasePools {
    pub name: String,
    pub primary: TimedPool,
    pub supplemental: TimedPool,
}

impl DatabasePools {
    /// Open both pools, attaching the configured schemas on every new connection
    pub async fn connect(config: &DatabaseConfig, pool_config: &PoolConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = connect_pool(config, pool_config).await?;
        let supplemental = connect_pool(config, pool_config).await?;

        info!(
            "Connected database '{}' at {} ({} attached schema(s))",
            config.name,
            config.path.display(),
            config.attach.len()
        );

        Ok(Self {
            name: config.name.clone(),
            primary: TimedPool::new(pool, Duration::from_millis(pool_config.statement_timeout_ms)),
            supplemental: TimedPool::new(
                supplemental,
                Duration::from_millis(pool_config.supp_statement_timeout_ms),
            ),
        })
    }

    /// Pick the pool for a query
    pub fn select(&self, supplemental: bool) -> &TimedPool {
        if supplemental {
            &self.supplemental
        } else {
            &self.primary
        }
    }

    pub async fn close(&self) {
        self.primary.pool().close().await;
        self.supplemental.pool().close().await;
    }
}

async fn connect_pool(config: &DatabaseConfig, pool_config: &PoolConfig) -> Result<SqlitePool> {
    for attach in &config.attach {
        if !super::is_valid_identifier(&attach.schema) {
            return Err(Error::Config(format!(
                "Invalid schema name '{}' attached to database '{}'",
                attach.schema, config.name
            )));
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(pool_config.busy_timeout_ms));

    let attach = Arc::new(config.attach.clone());
    let pool = SqlitePoolOptions::new()
        .max_connections(pool_config.size)
        .after_connect(move |conn, _meta| {
            let attach = Arc::clone(&attach);
            Box::pin(async move {
                for entry in attach.iter() {
                    let sql = format!("ATTACH DATABASE ? AS \"{}\"", entry.schema);
                    sqlx::query(&sql)
                        .bind(entry.path.to_string_lossy().into_owned())
                        .execute(&mut *conn)
                        .await?;
                    debug!("Attached {} as schema {}", entry.path.display(), entry.schema);
                }
                Ok(())
            })
        })
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// All configured entity databases, by name
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    databases: Arc<HashMap<String, DatabasePools>>,
}

impl EntityStore {
    pub async fn connect(configs: &[DatabaseConfig], pool_config: &PoolConfig) -> Result<Self> {
        let mut databases = HashMap::new();
        for config in configs {
            let pools = DatabasePools::connect(config, pool_config).await?;
            databases.insert(config.name.clone(), pools);
        }
        Ok(Self {
            databases: Arc::new(databases),
        })
    }

    pub fn from_pools(pools: Vec<DatabasePools>) -> Self {
        Self {
            databases: Arc::new(pools.into_iter().map(|p| (p.name.clone(), p)).collect()),
        }
    }

    /// Look up an entity database by the name stored in `cohort.entity_database`
    pub fn database(&self, name: &str) -> Result<&DatabasePools> {
        self.databases
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("entity database '{}'", name)))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.databases.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub async fn close(&self) {
        for pools in self.databases.values() {
            pools.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttachConfig;

    #[tokio::test]
    async fn test_attached_schema_is_visible() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            name: "publicdb".to_string(),
            path: dir.path().join("main.db"),
            attach: vec![AttachConfig {
                schema: "tissue".to_string(),
                path: dir.path().join("tissue.db"),
            }],
        };
        let pools = DatabasePools::connect(&config, &PoolConfig::default()).await.unwrap();

        sqlx::query("CREATE TABLE tissue.tdp_tissue (tissuename TEXT)")
            .execute(pools.primary.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO tissue.tdp_tissue VALUES ('T1')")
            .execute(pools.primary.pool())
            .await
            .unwrap();

        let count: i64 = pools
            .supplemental
            .run(
                sqlx::query_scalar("SELECT COUNT(*) FROM tissue.tdp_tissue")
                    .fetch_one(pools.supplemental.pool()),
            )
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_storage_timeout() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let timed = TimedPool::new(pool, Duration::from_millis(10));
        let result: Result<()> = timed
            .run(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<(), sqlx::Error>(())
            })
            .await;
        assert!(matches!(result, Err(Error::StorageTimeout(10))));
    }

    #[test]
    fn test_unknown_database_is_not_found() {
        let store = EntityStore::default();
        assert!(matches!(store.database("nope"), Err(Error::NotFound(_))));
    }
}
