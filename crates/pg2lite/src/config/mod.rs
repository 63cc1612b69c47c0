//! Configuration loading, validation and connection resolution.

mod types;
mod validation;

pub use types::*;

use crate::error::{MigrateError, Result};
use std::path::Path;
use std::str::FromStr;
use crate::source::tls::SslMode;
use tokio_postgres::config::SslMode as PgSslMode;
use tokio_postgres::Config as PgConfig;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// Unlike [`Config::validate`], this does not require connection fields:
    /// a file may hold only part of the settings, the rest coming from flags.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Pick exactly one way to reach the source.
    pub fn descriptor(&self) -> ConnectionDescriptor {
        if self
            .source
            .connection_string
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
        {
            ConnectionDescriptor::ConnectionString
        } else if self.ssh.enabled() {
            ConnectionDescriptor::Tunneled
        } else {
            ConnectionDescriptor::Direct
        }
    }
}

impl SourceConfig {
    /// Build a tokio-postgres config targeting `host:port`.
    ///
    /// The tunnel passes the loopback address and its local port; direct connections
    /// pass the configured host and port.
    pub fn pg_config(&self, host: &str, port: u16) -> Result<PgConfig> {
        let mut pg_config = PgConfig::new();
        pg_config.host(host);
        pg_config.port(port);
        pg_config.dbname(&self.database);
        pg_config.user(&self.user);
        if !self.password.is_empty() {
            pg_config.password(&self.password);
        }
        pg_config.ssl_mode(if self.ssl_mode()?.requires_tls() {
            PgSslMode::Require
        } else {
            PgSslMode::Disable
        });
        Ok(pg_config)
    }

    /// Parsed `ssl_mode`.
    pub fn ssl_mode(&self) -> Result<SslMode> {
        SslMode::parse(&self.ssl_mode)
    }

    /// Parse the explicit connection string.
    pub fn parse_connection_string(&self) -> Result<PgConfig> {
        let raw = self
            .connection_string
            .as_deref()
            .ok_or_else(|| MigrateError::Config("no connection string configured".into()))?;
        PgConfig::from_str(raw)
            .map_err(|e| MigrateError::Config(format!("invalid connection string: {}", e)))
    }
}
