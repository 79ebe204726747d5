//! # Cache Database
//!
//! Opens the SQLite file that backs [`LocalCache`](crate::cache::LocalCache).
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  DbConfig::new(path)          ← cache path from TallyConfig             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await  ← pool + WAL + migrations                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Arc<dyn LocalCache>          ← handed to the sync engine              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! WAL mode is enabled so a snapshot write never blocks a concurrent read.
//! The busy timeout covers the short window where two table snapshots
//! are written at once.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;

const MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Where the cache lives and how the pool around it behaves.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/tally/cache.db").pool_size(2);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: PathBuf,

    /// Connections held by the pool. Default: 4
    pub pool_size: u32,

    /// How long a caller waits for a free connection. Default: 10 seconds
    pub acquire_timeout: Duration,

    /// How long SQLite retries a locked database. Default: 5 seconds
    pub busy_timeout: Duration,

    /// Apply embedded migrations on open. Default: true
    pub migrate: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            path: path.into(),
            pool_size: 4,
            acquire_timeout: Duration::from_secs(10),
            busy_timeout: Duration::from_secs(5),
            migrate: true,
        }
    }

    /// A private in-memory database, used by tests and as the fallback
    /// when no data directory can be resolved.
    ///
    /// Every in-memory connection is its own empty database, so the pool
    /// is pinned to one connection.
    pub fn in_memory() -> Self {
        DbConfig {
            pool_size: 1,
            ..DbConfig::new(MEMORY_PATH)
        }
    }

    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn migrate(mut self, migrate: bool) -> Self {
        self.migrate = migrate;
        self
    }

    fn is_in_memory(&self) -> bool {
        self.path == Path::new(MEMORY_PATH)
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        if self.is_in_memory() {
            return SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()));
        }

        Ok(SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.busy_timeout))
    }
}

// =============================================================================
// Database
// =============================================================================

/// SQLite-backed local cache handle.
///
/// Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if missing) the cache file and migrates it.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.path.display(), "Opening local cache");

        let options = config.connect_options()?;
        debug!(pool_size = config.pool_size, "Connecting cache pool");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.pool_size)
            .min_connections(1)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        if config.migrate {
            migrations::run_migrations(&pool).await?;
        }

        Ok(Database { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the pool. Later cache operations fail with `ConnectionFailed`.
    pub async fn close(&self) {
        info!("Closing local cache");
        self.pool.close().await;
    }

    pub async fn is_reachable(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_cache_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.is_reachable().await);

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
        assert!(total >= 1);
    }

    #[tokio::test]
    async fn test_closed_cache_is_unreachable() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(!db.is_reachable().await);
    }

    #[tokio::test]
    async fn test_file_cache_survives_reopen() {
        let path = std::env::temp_dir().join(format!("tally-pool-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        sqlx::query("CREATE TABLE marker (n INTEGER)")
            .execute(db.pool())
            .await
            .unwrap();
        db.close().await;

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM marker")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(rows, 0);
        db.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_pool_size_never_zero() {
        let config = DbConfig::new("/tmp/tally-test.db").pool_size(0).migrate(false);
        assert_eq!(config.pool_size, 1);
        assert!(!config.migrate);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }
}
