#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Datakeep - lifecycle management for pooled SQLite databases
//!
//! Datakeep builds a connection pool (the engine) and a session factory from a
//! configuration, creates the registered tables on startup and releases the
//! pool on shutdown. Pooling is delegated to `r2d2`, SQL to `rusqlite`.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | `display` | Table formatting with `tabled` | `tabled` |
//! | `cli` | The `datakeep` binary | All above + `clap`, `tracing-subscriber` |
//!
//! # Architecture
//!
//! - **[`database`]**: engine, sessions, schema metadata and the [`Database`]
//!   lifecycle manager
//! - **[`config`]**: configuration loading
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use datakeep::{Database, DatabaseConfig, SchemaMetadata, TableDefinition};
//!
//! let metadata = SchemaMetadata::new()
//!     .table(TableDefinition::new("users", "id INTEGER PRIMARY KEY, name TEXT NOT NULL"))
//!     .table(TableDefinition::new("tasks", "id INTEGER PRIMARY KEY, title TEXT NOT NULL"));
//!
//! let config = DatabaseConfig::with_url("sqlite+memory://scratch");
//! let db = Database::new(&config, metadata)?;
//! db.initialize().await?;
//!
//! let names: Vec<String> = db
//!     .sessions()
//!     .scope(|session| session.query_map("SELECT name FROM users", [], |row| row.get(0)))
//!     .await?;
//!
//! db.close().await?;
//! assert_eq!(db.engine().status().connections, 0);
//! ```

pub mod config;
pub mod database;

pub use config::DatabaseConfig;

pub use database::{
    Database, DatabaseUrl, Engine, EngineOptions, PoolStatus, SchemaMetadata, SchemaStatus,
    Session, SessionFactory, SessionOptions, TableDefinition,
};
