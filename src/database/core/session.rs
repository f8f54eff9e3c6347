//! Unit-of-work sessions
//!
//! A [`Session`] holds one pooled connection. The first statement opens a
//! transaction which stays open until [`Session::commit`] or
//! [`Session::rollback`]; an uncommitted transaction is rolled back when the
//! session is dropped.

use anyhow::{anyhow, Result};
use rusqlite::{Connection, Params, Row};
use tracing::warn;

use super::engine::{Engine, PooledConn};

/// Behaviour shared by every session a factory creates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Drop cached prepared statements at commit, forcing them to be prepared
    /// again on next use
    pub expire_on_commit: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            expire_on_commit: false,
        }
    }
}

/// Produces sessions bound to an [`Engine`]
#[derive(Debug, Clone)]
pub struct SessionFactory {
    engine: Engine,
    options: SessionOptions,
}

impl SessionFactory {
    pub fn new(engine: Engine, options: SessionOptions) -> Self {
        Self { engine, options }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    /// Open a new session, checking a connection out of the pool
    pub fn session(&self) -> Result<Session> {
        let conn = self.engine.acquire()?;
        Ok(Session {
            conn,
            options: self.options,
            in_transaction: false,
        })
    }

    /// Run `f` as one unit of work and commit it
    ///
    /// If `f` fails the session is dropped uncommitted, which rolls it back.
    pub async fn scope<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Session) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let factory = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut session = factory.session()?;
            let value = f(&mut session)?;
            session.commit()?;
            Ok(value)
        })
        .await
        .map_err(|e| anyhow!("Database task failed: {}", e))?
    }
}

/// One unit of work on a pooled connection
pub struct Session {
    conn: PooledConn,
    options: SessionOptions,
    in_transaction: bool,
}

impl Session {
    /// Execute a statement, returning the number of changed rows
    pub fn execute<P: Params>(&mut self, sql: &str, params: P) -> Result<usize> {
        self.autobegin()?;
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| anyhow!("Failed to prepare statement: {}", e))?;
        stmt.execute(params)
            .map_err(|e| anyhow!("Failed to execute SQL: {}", e))
    }

    /// Fetch a single row
    pub fn query_row<T, P, F>(&mut self, sql: &str, params: P, f: F) -> Result<T>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.autobegin()?;
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| anyhow!("Failed to prepare statement: {}", e))?;
        stmt.query_row(params, f)
            .map_err(|e| anyhow!("Failed to query row: {}", e))
    }

    /// Fetch every row, mapping each one with `f`
    pub fn query_map<T, P, F>(&mut self, sql: &str, params: P, f: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.autobegin()?;
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| anyhow!("Failed to prepare statement: {}", e))?;
        let rows = stmt
            .query_map(params, f)
            .map_err(|e| anyhow!("Failed to query rows: {}", e))?;
        rows.collect::<rusqlite::Result<Vec<T>>>()
            .map_err(|e| anyhow!("Failed to read row: {}", e))
    }

    /// Commit the open transaction, if any
    pub fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.conn
                .execute_batch("COMMIT")
                .map_err(|e| anyhow!("Failed to commit transaction: {}", e))?;
            self.in_transaction = false;
        }
        if self.options.expire_on_commit {
            self.conn.flush_prepared_statement_cache();
        }
        Ok(())
    }

    /// Roll back the open transaction, if any
    pub fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.conn
                .execute_batch("ROLLBACK")
                .map_err(|e| anyhow!("Failed to roll back transaction: {}", e))?;
        }
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Underlying connection, for statements the session helpers do not cover
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn autobegin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.conn
                .execute_batch("BEGIN")
                .map_err(|e| anyhow!("Failed to begin transaction: {}", e))?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.rollback() {
            warn!("Failed to roll back session on drop: {}", e);
        }
    }
}
