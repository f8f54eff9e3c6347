//! Database URL parsing
//!
//! Two schemes are understood:
//! - `sqlite://PATH` for a file database (`sqlite:///abs/path` keeps the leading slash)
//! - `sqlite+memory://NAME` for a named in-memory database shared by all pooled connections

use anyhow::{anyhow, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const SQLITE_SCHEME: &str = "sqlite";
pub const SQLITE_MEMORY_SCHEME: &str = "sqlite+memory";

/// Resolved location of a SQLite database
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseUrl {
    /// Database stored in a file on disk
    File { path: PathBuf },

    /// Named in-memory database, alive while at least one connection is open
    Memory { name: String },
}

impl DatabaseUrl {
    /// Parse a connection URL
    pub fn parse(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| anyhow!("Invalid database URL '{}': missing '://'", url))?;

        match scheme {
            SQLITE_SCHEME => {
                if rest.is_empty() {
                    return Err(anyhow!("Invalid database URL '{}': empty file path", url));
                }
                // either form gives every pooled connection its own private database
                if rest == ":memory:" || rest.starts_with("file:") {
                    return Err(anyhow!(
                        "Invalid database URL '{}': use '{}://NAME' for an in-memory database",
                        url,
                        SQLITE_MEMORY_SCHEME
                    ));
                }
                Ok(DatabaseUrl::File {
                    path: PathBuf::from(rest),
                })
            }
            SQLITE_MEMORY_SCHEME => {
                if rest.is_empty() || rest.contains(['/', '?', '&', '#']) {
                    return Err(anyhow!(
                        "Invalid database URL '{}': in-memory database name must be a plain identifier",
                        url
                    ));
                }
                Ok(DatabaseUrl::Memory {
                    name: rest.to_string(),
                })
            }
            other => Err(anyhow!(
                "Unsupported database URL scheme '{}' in '{}'",
                other,
                url
            )),
        }
    }

    /// Target string handed to SQLite when opening a connection
    ///
    /// In-memory databases use a shared-cache URI so that every connection in the
    /// pool sees the same tables.
    pub fn connect_target(&self) -> String {
        match self {
            DatabaseUrl::File { path } => path.to_string_lossy().to_string(),
            DatabaseUrl::Memory { name } => format!("file:{}?mode=memory&cache=shared", name),
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, DatabaseUrl::Memory { .. })
    }

    /// Whether opening this URL would create a new database file
    pub fn is_missing_file(&self) -> bool {
        match self {
            DatabaseUrl::File { path } => !path.exists(),
            DatabaseUrl::Memory { .. } => false,
        }
    }

    /// Path of the database file, if file backed
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            DatabaseUrl::File { path } => Some(path.as_path()),
            DatabaseUrl::Memory { .. } => None,
        }
    }
}

impl FromStr for DatabaseUrl {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        DatabaseUrl::parse(s)
    }
}

impl fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseUrl::File { path } => write!(f, "{}://{}", SQLITE_SCHEME, path.display()),
            DatabaseUrl::Memory { name } => write!(f, "{}://{}", SQLITE_MEMORY_SCHEME, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_url() {
        let url = DatabaseUrl::parse("sqlite+memory://test").unwrap();
        assert_eq!(
            url,
            DatabaseUrl::Memory {
                name: "test".to_string()
            }
        );
        assert!(url.is_memory());
        assert_eq!(url.connect_target(), "file:test?mode=memory&cache=shared");
        assert_eq!(url.to_string(), "sqlite+memory://test");
    }

    #[test]
    fn test_parse_file_urls() {
        let absolute = DatabaseUrl::parse("sqlite:///var/lib/app/data.sqlite3").unwrap();
        assert_eq!(
            absolute.file_path(),
            Some(Path::new("/var/lib/app/data.sqlite3"))
        );
        assert_eq!(absolute.to_string(), "sqlite:///var/lib/app/data.sqlite3");

        let relative: DatabaseUrl = "sqlite://data.sqlite3".parse().unwrap();
        assert_eq!(relative.file_path(), Some(Path::new("data.sqlite3")));
        assert_eq!(relative.connect_target(), "data.sqlite3");
    }

    #[test]
    fn test_reject_bad_urls() {
        assert!(DatabaseUrl::parse("data.sqlite3").is_err());
        assert!(DatabaseUrl::parse("sqlite://").is_err());
        assert!(DatabaseUrl::parse("sqlite+memory://").is_err());
        assert!(DatabaseUrl::parse("sqlite+memory://a?mode=rw").is_err());

        let err = DatabaseUrl::parse("postgres://localhost/app").unwrap_err();
        assert!(err.to_string().contains("Unsupported database URL scheme"));
    }

    #[test]
    fn test_reject_per_connection_memory_urls() {
        for url in ["sqlite://:memory:", "sqlite://file:x?mode=memory"] {
            let err = DatabaseUrl::parse(url).unwrap_err();
            assert!(
                err.to_string().contains("sqlite+memory://NAME"),
                "unexpected error for {}: {}",
                url,
                err
            );
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sqlite3");
        let url = DatabaseUrl::File { path: path.clone() };
        assert!(url.is_missing_file());

        std::fs::write(&path, b"").unwrap();
        assert!(!url.is_missing_file());

        let memory = DatabaseUrl::parse("sqlite+memory://url_missing").unwrap();
        assert!(!memory.is_missing_file());
    }
}
