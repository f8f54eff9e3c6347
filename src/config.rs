use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use config::{Config, Environment};
use serde::Serialize;

use crate::database::{EngineOptions, SessionOptions};

pub const ENV_PREFIX: &str = "DATAKEEP";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseConfig {
    /// Directory holding the default database file
    pub data_dir: String,

    /// Explicit connection URL, overrides the file in `data_dir`
    pub url: Option<String>,

    /// Maximum number of pooled connections (default: 5)
    pub pool_size: u32,

    /// Check connections are alive before use (default: true)
    pub pool_pre_ping: bool,

    /// Seconds to wait for a free pooled connection (default: 30)
    pub connection_timeout_secs: u64,

    /// Milliseconds SQLite waits on a locked database (default: 5000)
    pub busy_timeout_ms: u64,

    /// Expire session state on commit (default: false)
    pub expire_on_commit: bool,
}

const EMPTY_CONFIG: &str = r#"### datakeep configuration file

### directory holding the default database file
# data_dir = "~/.datakeep"

### explicit connection URL, e.g. "sqlite:///var/lib/app/app.sqlite3" or "sqlite+memory://scratch"
# url = "sqlite:///var/lib/app/app.sqlite3"

### connection pool settings
# pool_size = 5
# pool_pre_ping = true
# connection_timeout_secs = 30
# busy_timeout_ms = 5000

### session settings
# expire_on_commit = false
"#;

impl Default for DatabaseConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());

        Self {
            data_dir: format!("{}/.datakeep", home_dir),
            url: None,
            pool_size: 5,
            pool_pre_ping: true,
            connection_timeout_secs: 30,
            busy_timeout_ms: 5000,
            expire_on_commit: false,
        }
    }
}

impl DatabaseConfig {
    /// Load the configuration
    ///
    /// Sources, later ones winning: the TOML file at `path` (by default
    /// `$HOME/.datakeep/datakeep.toml`), a `.env` file in the working directory,
    /// and `DATAKEEP_*` environment variables. A commented template is written
    /// when the file does not exist yet.
    pub fn new(path: &Option<String>) -> Result<DatabaseConfig> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(p) => p.clone(),
            None => {
                let home_dir = dirs::home_dir()
                    .ok_or_else(|| anyhow!("Could not find home directory"))?;
                let datakeep_dir = home_dir.join(".datakeep");
                std::fs::create_dir_all(&datakeep_dir)
                    .map_err(|e| anyhow!("Unable to create datakeep directory: {}", e))?;
                datakeep_dir
                    .join("datakeep.toml")
                    .to_str()
                    .ok_or_else(|| anyhow!("Could not convert config path to string"))?
                    .to_string()
            }
        };

        let file_path = Path::new(file.as_str());
        if !file_path.exists() {
            std::fs::write(file_path, EMPTY_CONFIG)
                .map_err(|e| anyhow!("Unable to create config file {}: {}", file, e))?;
        }

        Self::from_sources(Some(file_path), Environment::with_prefix(ENV_PREFIX))
    }

    /// Build a configuration from an optional file and an environment source
    pub fn from_sources(file: Option<&Path>, env: Environment) -> Result<DatabaseConfig> {
        let mut builder = Config::builder();

        if let Some(path) = file {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }

        // E.g., `DATAKEEP_POOL_SIZE=10 ./datakeep status` would set the pool size
        builder = builder.add_source(env);

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Ok(Self::from_settings(&config))
    }

    fn from_settings(config: &HashMap<String, String>) -> DatabaseConfig {
        let defaults = DatabaseConfig::default();

        let data_dir = config
            .get("data_dir")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.data_dir);

        let url = config
            .get("url")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        DatabaseConfig {
            data_dir,
            url,
            pool_size: parse_or(config, "pool_size", defaults.pool_size),
            pool_pre_ping: parse_or(config, "pool_pre_ping", defaults.pool_pre_ping),
            connection_timeout_secs: parse_or(
                config,
                "connection_timeout_secs",
                defaults.connection_timeout_secs,
            ),
            busy_timeout_ms: parse_or(config, "busy_timeout_ms", defaults.busy_timeout_ms),
            expire_on_commit: parse_or(config, "expire_on_commit", defaults.expire_on_commit),
        }
    }

    /// Configuration bound to an explicit URL, all other settings default
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Connection URL for the database
    pub fn url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "sqlite://{}/datakeep.sqlite3",
                self.data_dir.trim_end_matches('/')
            ),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            pool_size: self.pool_size,
            pre_ping: self.pool_pre_ping,
            connection_timeout: Duration::from_secs(self.connection_timeout_secs),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            expire_on_commit: self.expire_on_commit,
        }
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        [
            format!("Data Directory:     {}", self.data_dir),
            format!("Database URL:       {}", self.url()),
            format!("Pool Size:          {}", self.pool_size),
            format!("Pool Pre-ping:      {}", self.pool_pre_ping),
            format!("Connect Timeout:    {} seconds", self.connection_timeout_secs),
            format!("Busy Timeout:       {} ms", self.busy_timeout_ms),
            format!("Expire on Commit:   {}", self.expire_on_commit),
        ]
        .join("\n")
    }

    /// Get the default config file path
    pub fn config_file_path() -> String {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("{}/.datakeep/datakeep.toml", home_dir)
    }
}

fn parse_or<T: std::str::FromStr>(config: &HashMap<String, String>, key: &str, default: T) -> T {
    config
        .get(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(HashMap::new()))
    }

    #[test]
    fn test_default_config() {
        let config = DatabaseConfig::default();
        assert!(config.data_dir.ends_with("/.datakeep"));
        assert_eq!(config.url, None);
        assert_eq!(config.pool_size, 5);
        assert!(config.pool_pre_ping);
        assert!(!config.expire_on_commit);
    }

    #[test]
    fn test_default_url() {
        let config = DatabaseConfig {
            data_dir: "/srv/data/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.url(), "sqlite:///srv/data/datakeep.sqlite3");

        let config = DatabaseConfig::with_url("sqlite+memory://test");
        assert_eq!(config.url(), "sqlite+memory://test");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datakeep.toml");
        std::fs::write(
            &path,
            r#"
url = "sqlite+memory://from_file"
pool_size = 3
pool_pre_ping = false
busy_timeout_ms = 250
"#,
        )
        .unwrap();

        let config = DatabaseConfig::from_sources(Some(&path), no_env()).unwrap();
        assert_eq!(config.url(), "sqlite+memory://from_file");
        assert_eq!(config.pool_size, 3);
        assert!(!config.pool_pre_ping);
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.connection_timeout_secs, 30);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datakeep.toml");
        std::fs::write(&path, "pool_size = 3\n").unwrap();

        let mut vars = HashMap::new();
        vars.insert("DATAKEEP_POOL_SIZE".to_string(), "8".to_string());
        vars.insert("DATAKEEP_EXPIRE_ON_COMMIT".to_string(), "true".to_string());
        let env = Environment::with_prefix(ENV_PREFIX).source(Some(vars));

        let config = DatabaseConfig::from_sources(Some(&path), env).unwrap();
        assert_eq!(config.pool_size, 8);
        assert!(config.expire_on_commit);
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let mut vars = HashMap::new();
        vars.insert("DATAKEEP_POOL_SIZE".to_string(), "many".to_string());
        let env = Environment::with_prefix(ENV_PREFIX).source(Some(vars));

        let config = DatabaseConfig::from_sources(None, env).unwrap();
        assert_eq!(config.pool_size, 5);
    }

    #[test]
    fn test_new_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.toml");

        let config = DatabaseConfig::new(&Some(path.to_string_lossy().to_string())).unwrap();

        assert!(path.exists());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("datakeep configuration file"));
        assert_eq!(config.pool_size, DatabaseConfig::default().pool_size);
    }

    #[test]
    fn test_engine_and_session_options() {
        let config = DatabaseConfig {
            pool_size: 2,
            busy_timeout_ms: 100,
            ..Default::default()
        };

        let engine = config.engine_options();
        assert_eq!(engine.pool_size, 2);
        assert!(engine.pre_ping);
        assert_eq!(engine.busy_timeout, Duration::from_millis(100));
        assert!(!config.session_options().expire_on_commit);
    }
}
