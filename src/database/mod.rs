//! Database module
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/           # Foundation
//! │   ├── url         # Connection URL parsing
//! │   ├── engine      # r2d2 pool of SQLite connections
//! │   ├── session     # Unit-of-work sessions
//! │   └── schema      # Table definitions and schema status
//! │
//! └── lifecycle       # Database: construct, initialize, close
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use datakeep::config::DatabaseConfig;
//! use datakeep::database::{Database, SchemaMetadata, TableDefinition};
//!
//! let metadata = SchemaMetadata::new()
//!     .table(TableDefinition::new("users", "id INTEGER PRIMARY KEY, name TEXT NOT NULL"));
//!
//! let db = Database::new(&DatabaseConfig::new(&None)?, metadata)?;
//! db.initialize().await?;
//!
//! db.sessions()
//!     .scope(|session| session.execute("INSERT INTO users (name) VALUES (?1)", ["alice"]))
//!     .await?;
//!
//! db.close().await?;
//! ```

pub mod core;
mod lifecycle;

#[cfg(test)]
mod test_capture;

pub use self::core::{
    table_exists, table_row_count, DatabaseUrl, Engine, EngineOptions, PoolStatus, PooledConn,
    SchemaMetadata, SchemaStatus, Session, SessionFactory, SessionOptions, SqlitePool,
    TableDefinition,
};
pub use lifecycle::Database;
