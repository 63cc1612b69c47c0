//! Configuration validation.

use super::{Config, ConnectionDescriptor};
use crate::error::{MigrateError, Result};

const SSL_MODES: &[&str] = &["disable", "require", "verify-full"];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    match config.descriptor() {
        ConnectionDescriptor::ConnectionString => {
            config.source.parse_connection_string()?;
        }
        ConnectionDescriptor::Tunneled | ConnectionDescriptor::Direct => {
            if config.source.host.is_empty() {
                return Err(MigrateError::Config("source.host is required".into()));
            }
            if config.source.database.is_empty() {
                return Err(MigrateError::Config("source.database is required".into()));
            }
            if config.source.user.is_empty() {
                return Err(MigrateError::Config("source.user is required".into()));
            }
        }
    }

    if !SSL_MODES.contains(&config.source.ssl_mode.to_lowercase().as_str()) {
        return Err(MigrateError::Config(format!(
            "Invalid source.ssl_mode '{}'. Valid values: disable, require, verify-full",
            config.source.ssl_mode
        )));
    }

    // SSH validation - only when a tunnel will actually be opened
    if config.descriptor() == ConnectionDescriptor::Tunneled {
        if config.ssh.host.is_empty() {
            return Err(MigrateError::Config(
                "ssh.host is required when ssh.key_path is set".into(),
            ));
        }
        if config.ssh.user.is_empty() {
            return Err(MigrateError::Config(
                "ssh.user is required when ssh.key_path is set".into(),
            ));
        }
    }

    if config.migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if config.migration.output.as_os_str().is_empty() {
        return Err(MigrateError::Config("migration.output is required".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, SshConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                connection_string: None,
                host: "localhost".to_string(),
                port: 5432,
                database: "source_db".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                ssl_mode: "disable".to_string(),
            },
            ssh: SshConfig::default(),
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_database() {
        let mut config = valid_config();
        config.source.database = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_connection_string_skips_structured_checks() {
        let mut config = valid_config();
        config.source.database = "".to_string();
        config.source.user = "".to_string();
        config.source.connection_string = Some("host=db dbname=app user=me".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_malformed_connection_string() {
        let mut config = valid_config();
        config.source.connection_string = Some("host='unterminated".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_ssh_requires_host_and_user() {
        let mut config = valid_config();
        config.ssh.key_path = Some("/home/me/.ssh/id_rsa".into());
        assert!(validate(&config).is_err());

        config.ssh.host = "bastion".to_string();
        assert!(validate(&config).is_err());

        config.ssh.user = "deploy".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_ssl_mode() {
        let mut config = valid_config();
        config.source.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.migration.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        config.source.connection_string =
            Some("host=db password=super_secret_password_123".to_string());
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }

    #[test]
    fn test_ssh_config_debug_redacts_passphrase() {
        let mut config = valid_config();
        config.ssh.key_passphrase = Some("super_secret_passphrase_456".to_string());
        let debug_output = format!("{:?}", config.ssh);
        assert!(!debug_output.contains("super_secret_passphrase_456"));
    }
}
