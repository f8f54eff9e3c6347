//! Pooled connection engine
//!
//! `Engine` owns an `r2d2` pool of SQLite connections bound to one [`DatabaseUrl`].
//! Blocking SQLite work is moved onto tokio's blocking threads so callers can
//! await it from async code.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{anyhow, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction};
use serde::Serialize;
use tracing::{debug, info};

use super::url::DatabaseUrl;

pub type SqlitePool = Pool<SqliteConnectionManager>;
pub type PooledConn = PooledConnection<SqliteConnectionManager>;

/// Pool and connection settings for an [`Engine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Maximum number of pooled connections
    pub pool_size: u32,

    /// Check each connection is alive before handing it out
    pub pre_ping: bool,

    /// How long a checkout waits for a free connection
    pub connection_timeout: Duration,

    /// How long SQLite waits on a locked database before giving up
    pub busy_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            pool_size: 5,
            pre_ping: true,
            connection_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

/// Snapshot of the pool state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Connections owned by the pool, idle or checked out
    pub connections: u32,
    pub idle_connections: u32,
    pub disposed: bool,
}

/// Handle to a pool of connections for one database
///
/// Cloning is cheap and every clone refers to the same pool, so disposing
/// through any handle disposes it for all of them.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    url: DatabaseUrl,
    options: EngineOptions,
    pool: RwLock<Option<SqlitePool>>,
}

impl Engine {
    /// Build the connection pool for `url`
    ///
    /// Blocks until the pool has opened its initial connections, so a bad path
    /// or an unusable database fails here.
    pub fn connect(url: DatabaseUrl, options: EngineOptions) -> Result<Self> {
        if options.pool_size == 0 {
            return Err(anyhow!("Pool size must be greater than zero"));
        }
        if options.connection_timeout.is_zero() {
            return Err(anyhow!("Connection timeout must be greater than zero"));
        }

        let busy_timeout = options.busy_timeout;
        let file_backed = !url.is_memory();
        let manager = SqliteConnectionManager::file(url.connect_target())
            .with_init(move |conn| configure_connection(conn, busy_timeout, file_backed));

        let pool = Pool::builder()
            .max_size(options.pool_size)
            .test_on_check_out(options.pre_ping)
            .connection_timeout(options.connection_timeout)
            .build(manager)
            .map_err(|e| anyhow!("Failed to create connection pool for '{}': {}", url, e))?;

        debug!(
            "Connection pool for '{}' ready with {} connections",
            url,
            pool.state().connections
        );

        Ok(Engine {
            inner: Arc::new(EngineInner {
                url,
                options,
                pool: RwLock::new(Some(pool)),
            }),
        })
    }

    /// URL this engine is bound to
    pub fn url(&self) -> &DatabaseUrl {
        &self.inner.url
    }

    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    pub fn is_disposed(&self) -> bool {
        self.current_pool().is_none()
    }

    /// Current pool state; all zeros once disposed
    pub fn status(&self) -> PoolStatus {
        match self.current_pool() {
            Some(pool) => {
                let state = pool.state();
                PoolStatus {
                    connections: state.connections,
                    idle_connections: state.idle_connections,
                    disposed: false,
                }
            }
            None => PoolStatus {
                connections: 0,
                idle_connections: 0,
                disposed: true,
            },
        }
    }

    /// Check a connection out of the pool
    ///
    /// Blocks up to the connection timeout. Fails once the engine is disposed.
    pub fn acquire(&self) -> Result<PooledConn> {
        let pool = self
            .current_pool()
            .ok_or_else(|| anyhow!("Engine for '{}' has been disposed", self.inner.url))?;

        pool.get().map_err(|e| {
            anyhow!(
                "Failed to acquire connection for '{}': {}",
                self.inner.url,
                e
            )
        })
    }

    /// Run `f` inside a transaction on a pooled connection
    ///
    /// Commits when `f` returns `Ok`. On any error the transaction is rolled back,
    /// and the connection goes back to the pool on every path.
    pub async fn begin<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = engine.acquire()?;
            let tx = conn
                .transaction()
                .map_err(|e| anyhow!("Failed to begin transaction: {}", e))?;
            let value = f(&tx)?;
            tx.commit()
                .map_err(|e| anyhow!("Failed to commit transaction: {}", e))?;
            Ok(value)
        })
        .await
        .map_err(|e| anyhow!("Database task failed: {}", e))?
    }

    /// Run `f` with a pooled connection, outside of any explicit transaction
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || {
            let conn = engine.acquire()?;
            f(&conn)
        })
        .await
        .map_err(|e| anyhow!("Database task failed: {}", e))?
    }

    /// Release every pooled connection
    ///
    /// File databases in WAL mode are checkpointed first; a checkpoint blocked by
    /// another reader is reported as an error, but the pool is released anyway.
    /// Connections still checked out are closed when they are returned.
    /// Disposing an already disposed engine does nothing.
    pub async fn dispose(&self) -> Result<()> {
        let pool = match self.take_pool() {
            Some(pool) => pool,
            None => {
                debug!("Engine for '{}' is already disposed", self.inner.url);
                return Ok(());
            }
        };

        let url = self.inner.url.clone();
        tokio::task::spawn_blocking(move || {
            let checkpoint = if url.is_memory() {
                Ok(())
            } else {
                checkpoint_wal(&pool, &url)
            };
            drop(pool);
            info!("Released connection pool for '{}'", url);
            checkpoint
        })
        .await
        .map_err(|e| anyhow!("Database task failed: {}", e))?
    }

    fn current_pool(&self) -> Option<SqlitePool> {
        match self.inner.pool.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn take_pool(&self) -> Option<SqlitePool> {
        match self.inner.pool.write() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("url", &self.inner.url)
            .field("status", &self.status())
            .finish()
    }
}

/// Settings applied to every new connection in the pool
fn configure_connection(
    conn: &mut Connection,
    busy_timeout: Duration,
    file_backed: bool,
) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    if file_backed {
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
    }

    Ok(())
}

/// Fold the write-ahead log back into the main database file
fn checkpoint_wal(pool: &SqlitePool, url: &DatabaseUrl) -> Result<()> {
    let conn = pool
        .get()
        .map_err(|e| anyhow!("Failed to acquire connection for '{}': {}", url, e))?;

    let (busy, log_frames, checkpointed): (i64, i64, i64) = conn
        .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .map_err(|e| anyhow!("Failed to checkpoint '{}': {}", url, e))?;

    if busy != 0 {
        return Err(anyhow!(
            "WAL checkpoint for '{}' did not complete ({} of {} frames): database is busy",
            url,
            checkpointed,
            log_frames
        ));
    }

    debug!("Checkpointed {} WAL frames for '{}'", checkpointed, url);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_engine(name: &str, pool_size: u32) -> Engine {
        let url = DatabaseUrl::parse(&format!("sqlite+memory://engine_{}", name)).unwrap();
        let options = EngineOptions {
            pool_size,
            ..Default::default()
        };
        Engine::connect(url, options).unwrap()
    }

    #[test]
    fn test_connect_opens_pool() {
        let engine = memory_engine("connect", 2);
        let status = engine.status();

        assert_eq!(status.connections, 2);
        assert!(!status.disposed);
        assert_eq!(engine.url().to_string(), "sqlite+memory://engine_connect");
    }

    #[test]
    fn test_reject_zero_pool_size() {
        let url = DatabaseUrl::parse("sqlite+memory://engine_zero").unwrap();
        let options = EngineOptions {
            pool_size: 0,
            ..Default::default()
        };
        assert!(Engine::connect(url, options).is_err());
    }

    #[test]
    fn test_pooled_connections_share_memory_database() {
        let engine = memory_engine("shared", 2);

        let first = engine.acquire().unwrap();
        first
            .execute_batch("CREATE TABLE shared_items (id INTEGER PRIMARY KEY)")
            .unwrap();

        let second = engine.acquire().unwrap();
        let count: i64 = second
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='shared_items'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_begin_commits_on_success() {
        let engine = memory_engine("commit", 2);

        engine
            .begin(|tx| {
                tx.execute_batch(
                    "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL);
                     INSERT INTO notes (body) VALUES ('first');",
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let count: i64 = engine
            .run(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_begin_rolls_back_on_error() {
        let engine = memory_engine("rollback", 2);
        engine
            .run(|conn| {
                conn.execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")?;
                Ok(())
            })
            .await
            .unwrap();

        let result: Result<()> = engine
            .begin(|tx| {
                tx.execute("INSERT INTO notes (body) VALUES ('lost')", [])?;
                Err(anyhow!("abort unit of work"))
            })
            .await;
        assert_eq!(result.unwrap_err().to_string(), "abort unit of work");

        let count: i64 = engine
            .run(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(engine.status().idle_connections, 2);
    }

    #[tokio::test]
    async fn test_dispose_releases_pool() {
        let engine = memory_engine("dispose", 3);
        let handle = engine.clone();

        engine.dispose().await.unwrap();

        let status = handle.status();
        assert!(status.disposed);
        assert_eq!(status.connections, 0);
        assert!(handle.is_disposed());

        let err = handle.acquire().unwrap_err();
        assert!(err.to_string().contains("has been disposed"));

        // disposing twice is a no-op
        engine.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_engine_uses_wal_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.sqlite3");
        let url = DatabaseUrl::File { path: path.clone() };
        let engine = Engine::connect(url, EngineOptions::default()).unwrap();

        let mode: String = engine
            .run(|conn| Ok(conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(mode, "wal");

        engine
            .begin(|tx| {
                tx.execute_batch(
                    "CREATE TABLE items (id INTEGER PRIMARY KEY);
                     INSERT INTO items (id) VALUES (1), (2);",
                )?;
                Ok(())
            })
            .await
            .unwrap();

        engine.dispose().await.unwrap();
        assert!(path.exists());

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }
}
