use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::db::Credentials;
use crate::core::{HospdbError, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "HOSPDB_CONFIG";

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub logging: Option<LoggingConfig>,
}

/// Connection settings. Every field may also come from the libpq
/// environment variables (`PGHOST`, `PGPORT`, `PGUSER`, `PGPASSWORD`,
/// `PGDATABASE`), which take precedence over the file.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub search_path: Option<String>,
    pub connect_timeout_secs: Option<u64>,
}

/// Logging configuration.
#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset, e.g. "debug" or "hospdb=trace"
    pub level: Option<String>,
}

impl Config {
    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref()?.level.as_deref()
    }
}

impl DatabaseConfig {
    /// Overrides fields from libpq-style variables supplied by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("PGHOST") {
            self.host = Some(host);
        }
        if let Some(port) = lookup("PGPORT") {
            let port = port
                .parse()
                .map_err(|_| HospdbError::Config(format!("PGPORT is not a valid port: {:?}", port)))?;
            self.port = Some(port);
        }
        if let Some(user) = lookup("PGUSER") {
            self.username = Some(user);
        }
        if let Some(password) = lookup("PGPASSWORD") {
            self.password = Some(password);
        }
        if let Some(database) = lookup("PGDATABASE") {
            self.database = Some(database);
        }
        Ok(())
    }

    /// Builds credentials, failing on the first missing required field.
    pub fn credentials(&self) -> Result<Credentials> {
        fn required<'a, T>(value: &'a Option<T>, field: &str) -> Result<&'a T> {
            value
                .as_ref()
                .ok_or_else(|| HospdbError::Config(format!("missing database.{}", field)))
        }

        let mut credentials = Credentials::new(
            required(&self.database, "database")?.as_str(),
            required(&self.username, "username")?.as_str(),
            required(&self.password, "password")?.as_str(),
            required(&self.host, "host")?.as_str(),
            *required(&self.port, "port")?,
        );
        if let Some(path) = &self.search_path {
            credentials = credentials.with_search_path(path.as_str());
        }
        if let Some(secs) = self.connect_timeout_secs {
            credentials = credentials.with_connect_timeout(Duration::from_secs(secs));
        }
        Ok(credentials)
    }
}

/// Loads configuration from a TOML file at the given path.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Config::from_toml(&content)
}

/// `<config dir>/hospdb/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hospdb").join("config.toml"))
}

/// Finds the configuration file: explicit path, then `$HOSPDB_CONFIG`,
/// then the default location if a file exists there.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    default_config_path().filter(|path| path.exists())
}

/// Loads the configuration file (if any) and applies environment overrides.
///
/// A path given explicitly or through `$HOSPDB_CONFIG` must exist.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let mut config = match resolve_config_path(explicit) {
        Some(path) => load_config(&path).map_err(|e| match e {
            HospdbError::Io(io) => {
                HospdbError::Config(format!("cannot read {}: {}", path.display(), io))
            }
            other => other,
        })?,
        None => Config::default(),
    };
    config.database.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}
