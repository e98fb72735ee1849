use crate::config::AppConfig;
use crate::errors::ServiceError;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub type DbPool = DatabaseConnection;

/// Pool tuning for the lot and ticket store.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

impl DbConfig {
    /// True for `sqlite::memory:` style URLs, where each pooled connection sees its own database.
    pub fn is_sqlite_memory(&self) -> bool {
        self.url.starts_with("sqlite:") && self.url.contains(":memory:")
    }

    /// Pool bounds actually handed to the driver.
    pub fn effective_bounds(&self) -> (u32, u32) {
        if self.is_sqlite_memory() {
            return (1, 1);
        }
        let max = self.max_connections.max(1);
        (max, self.min_connections.min(max))
    }
}

/// Opens the pool described by `config`.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let (max, min) = config.effective_bounds();
    if config.is_sqlite_memory() && config.max_connections != 1 {
        warn!(
            requested = config.max_connections,
            "In-memory SQLite store pinned to a single connection"
        );
    }

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(max)
        .min_connections(min)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    debug!(max_connections = max, min_connections = min, "Opening store pool");

    let pool = Database::connect(opt).await.map_err(|e| {
        error!(error = %e, "Could not open store pool");
        ServiceError::DatabaseError(e)
    })?;

    info!(backend = ?pool.get_database_backend(), "Store pool ready");
    Ok(pool)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    establish_connection_with_config(&DbConfig::from(cfg)).await
}

/// Applies every pending schema migration; already-applied ones are skipped.
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let start = Instant::now();
    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(|e| ServiceError::MigrationError(e.to_string()));

    match &result {
        Ok(()) => info!(elapsed = ?start.elapsed(), "Schema is up to date"),
        Err(e) => error!(elapsed = ?start.elapsed(), error = %e, "Schema migration failed"),
    }
    result
}

/// Round-trips a ping; used by `/health`.
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    pool.ping().await.map_err(|e| {
        warn!(error = %e, "Store ping failed");
        ServiceError::DatabaseError(e)
    })
}
