//! Configuration loading and validation.

mod types;

pub use types::*;

use crate::error::{MigrateError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from a SQLite path and a PostgreSQL URL,
    /// falling back to the DATABASE_URL environment variable for the target.
    pub fn from_parts(sqlite: impl Into<std::path::PathBuf>, pg_url: Option<String>) -> Result<Self> {
        let url = pg_url
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .ok_or_else(|| {
                MigrateError::Config(
                    "PostgreSQL connection string not provided (use --pg or set DATABASE_URL)"
                        .into(),
                )
            })?;

        let config = Config {
            source: SourceConfig {
                path: sqlite.into(),
            },
            target: TargetConfig::from_url(url),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.source.path.as_os_str().is_empty() {
            return Err(MigrateError::Config("source.path is required".into()));
        }

        if self.target.url.is_none() {
            if self.target.host.is_empty() {
                return Err(MigrateError::Config("target.host is required".into()));
            }
            if self.target.database.is_empty() {
                return Err(MigrateError::Config("target.database is required".into()));
            }
            if self.target.user.is_empty() {
                return Err(MigrateError::Config("target.user is required".into()));
            }
        }

        Ok(())
    }
}
