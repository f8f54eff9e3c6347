//! Database schema management
//!
//! Table definitions are collected into a [`SchemaMetadata`] which the caller
//! hands to the database explicitly. Creating the schema is idempotent: tables
//! that already exist are left untouched.

use std::path::Path;

use anyhow::{anyhow, Result};
use config::Config;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Definition of a single table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name
    pub name: String,

    /// Column and constraint list, i.e. the body of `CREATE TABLE name (...)`
    pub columns: String,

    /// Index statements, expected to use `CREATE INDEX IF NOT EXISTS`
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, columns: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into(),
            indexes: Vec::new(),
        }
    }

    /// Add an index statement
    pub fn index(mut self, sql: impl Into<String>) -> Self {
        self.indexes.push(sql.into());
        self
    }

    pub fn create_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            self.name,
            self.columns.trim()
        )
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("Table definition has an empty name"));
        }
        if self.name.contains('"') {
            return Err(anyhow!("Invalid table name '{}'", self.name));
        }
        Ok(())
    }
}

/// Registry of table definitions applied by schema initialization
///
/// Tables are created in registration order, so a table referenced by a
/// foreign key should be registered before the tables that reference it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    #[serde(default)]
    tables: Vec<TableDefinition>,
}

impl SchemaMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table; a definition with the same name is replaced
    pub fn table(mut self, definition: TableDefinition) -> Self {
        match self.tables.iter_mut().find(|t| t.name == definition.name) {
            Some(existing) => *existing = definition,
            None => self.tables.push(definition),
        }
        self
    }

    /// Load table definitions from a file (TOML, JSON or YAML by extension)
    ///
    /// ```toml
    /// [[tables]]
    /// name = "users"
    /// columns = "id INTEGER PRIMARY KEY, name TEXT NOT NULL"
    /// indexes = ["CREATE INDEX IF NOT EXISTS idx_users_name ON users(name)"]
    /// ```
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow!("Schema file '{}' does not exist", path.display()));
        }

        let settings = Config::builder()
            .add_source(config::File::from(path))
            .build()
            .map_err(|e| anyhow!("Failed to read schema file '{}': {}", path.display(), e))?;

        let metadata = settings
            .try_deserialize::<SchemaMetadata>()
            .map_err(|e| anyhow!("Failed to parse schema file '{}': {}", path.display(), e))?;

        for table in &metadata.tables {
            table.validate()?;
        }

        Ok(metadata)
    }

    pub fn tables(&self) -> &[TableDefinition] {
        &self.tables
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Create every registered table that does not exist yet, then its indexes
    pub fn create_all(&self, conn: &Connection) -> Result<()> {
        for table in &self.tables {
            table.validate()?;

            if table_exists(conn, &table.name)? {
                debug!("Table '{}' already exists", table.name);
            } else {
                conn.execute_batch(&table.create_sql())
                    .map_err(|e| anyhow!("Failed to create table '{}': {}", table.name, e))?;
                debug!("Created table '{}'", table.name);
            }

            for index_sql in &table.indexes {
                conn.execute_batch(index_sql).map_err(|e| {
                    anyhow!("Failed to create index on '{}': {}", table.name, e)
                })?;
            }
        }

        Ok(())
    }

    /// Drop every registered table, in reverse registration order
    pub fn drop_all(&self, conn: &Connection) -> Result<()> {
        for table in self.tables.iter().rev() {
            table.validate()?;
            conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\"", table.name))
                .map_err(|e| anyhow!("Failed to drop table '{}': {}", table.name, e))?;
        }
        Ok(())
    }

    /// Compare the registered tables against what exists in the database
    pub fn check_status(&self, conn: &Connection) -> Result<SchemaStatus> {
        let mut missing = Vec::new();
        for table in &self.tables {
            if !table_exists(conn, &table.name)? {
                missing.push(table.name.clone());
            }
        }

        if missing.is_empty() {
            Ok(SchemaStatus::Current)
        } else if missing.len() == self.tables.len() {
            Ok(SchemaStatus::NotInitialized)
        } else {
            Ok(SchemaStatus::Partial { missing })
        }
    }
}

/// Status of the database schema relative to a [`SchemaMetadata`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SchemaStatus {
    /// None of the registered tables exist
    NotInitialized,

    /// Some registered tables are missing
    Partial { missing: Vec<String> },

    /// Every registered table exists
    Current,
}

impl std::fmt::Display for SchemaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaStatus::NotInitialized => write!(f, "not initialized"),
            SchemaStatus::Partial { missing } => write!(f, "partial (missing: {})", missing.join(", ")),
            SchemaStatus::Current => write!(f, "current"),
        }
    }
}

/// Check if a table exists in the database
pub fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table_name],
            |row| row.get(0),
        )
        .map_err(|e| anyhow!("Failed to check table existence: {}", e))?;
    Ok(count > 0)
}

/// Get the row count for a table
pub fn table_row_count(conn: &Connection, table_name: &str) -> Result<u64> {
    let query = format!("SELECT COUNT(*) FROM \"{}\"", table_name.replace('"', "\"\""));
    let count: u64 = conn
        .query_row(&query, [], |row| row.get(0))
        .map_err(|e| anyhow!("Failed to count rows in '{}': {}", table_name, e))?;
    Ok(count)
}
