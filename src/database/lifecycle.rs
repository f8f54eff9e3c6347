//! Database lifecycle: construct, initialize, close
//!
//! [`Database`] owns the connection engine and the session factory bound to it.
//! The expected sequence is construct, [`Database::initialize`], normal use
//! through [`Database::sessions`], then [`Database::close`]. Callers serialize
//! these transitions; nothing here guards against calling them out of order.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{error, info};

use crate::config::DatabaseConfig;
use crate::database::core::{
    DatabaseUrl, Engine, SchemaMetadata, SchemaStatus, SessionFactory,
};

pub struct Database {
    engine: Engine,
    sessions: SessionFactory,
    metadata: Arc<SchemaMetadata>,
}

impl Database {
    /// Build the engine and session factory for `config.url()`
    ///
    /// The pool checks connections before handing them out when
    /// `pool_pre_ping` is set, and sessions keep their state across commits
    /// unless `expire_on_commit` is set. URL and driver errors are returned
    /// as-is.
    pub fn new(config: &DatabaseConfig, metadata: SchemaMetadata) -> Result<Self> {
        info!("Initializing database engine and session maker.");

        let url = DatabaseUrl::parse(&config.url())?;
        if let Some(parent) = url.file_path().and_then(|p| p.parent()) {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    anyhow!(
                        "Failed to create data directory '{}': {}",
                        parent.display(),
                        e
                    )
                })?;
            }
        }

        let engine = Engine::connect(url, config.engine_options())?;
        let sessions = SessionFactory::new(engine.clone(), config.session_options());

        info!("Database engine and session maker initialized successfully.");
        Ok(Database {
            engine,
            sessions,
            metadata: Arc::new(metadata),
        })
    }

    /// Create every registered table that does not exist yet
    ///
    /// Runs in a single transaction on one pooled connection. Returns `self`
    /// so calls can be chained.
    pub async fn initialize(&self) -> Result<&Self> {
        info!("Starting database schema initialization.");

        let metadata = self.metadata.clone();
        match self.engine.begin(move |tx| metadata.create_all(tx)).await {
            Ok(()) => {
                info!("Database schema initialized successfully.");
                Ok(self)
            }
            Err(e) => {
                error!("Error initializing database schema: {}", e);
                Err(e)
            }
        }
    }

    /// Dispose the engine, releasing every pooled connection
    pub async fn close(&self) -> Result<()> {
        info!("Closing database engine and releasing resources.");

        match self.engine.dispose().await {
            Ok(()) => {
                info!("Database engine closed successfully.");
                Ok(())
            }
            Err(e) => {
                error!("Error closing database engine: {}", e);
                Err(e)
            }
        }
    }

    /// State of the registered tables in the store
    pub async fn schema_status(&self) -> Result<SchemaStatus> {
        let metadata = self.metadata.clone();
        self.engine.run(move |conn| metadata.check_status(conn)).await
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn sessions(&self) -> &SessionFactory {
        &self.sessions
    }

    pub fn metadata(&self) -> &SchemaMetadata {
        &self.metadata
    }
}
