//! Core database infrastructure
//!
//! This module provides the foundational database components:
//! - `DatabaseUrl`: Connection URL parsing
//! - `Engine`: Pool of SQLite connections bound to one URL
//! - `SessionFactory`/`Session`: Unit-of-work handles on pooled connections
//! - `SchemaMetadata`: Table definitions and idempotent schema creation

mod engine;
mod schema;
mod session;
mod url;

pub use engine::{Engine, EngineOptions, PoolStatus, PooledConn, SqlitePool};
pub use schema::{table_exists, table_row_count, SchemaMetadata, SchemaStatus, TableDefinition};
pub use session::{Session, SessionFactory, SessionOptions};
pub use url::{DatabaseUrl, SQLITE_MEMORY_SCHEME, SQLITE_SCHEME};
