//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::MigrateError;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Source database configuration (PostgreSQL).
    #[serde(default)]
    pub source: SourceConfig,

    /// Optional SSH tunnel to reach the source through a bastion host.
    #[serde(default)]
    pub ssh: SshConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Full libpq-style connection string. Takes priority over every other field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    /// Database host (default: localhost).
    #[serde(default = "default_localhost")]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password. Omitted from the connection when empty.
    #[serde(default)]
    pub password: String,

    /// SSL mode: disable, require or verify-full (default: require).
    #[serde(default = "default_require")]
    pub ssl_mode: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            host: default_localhost(),
            port: default_pg_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            ssl_mode: default_require(),
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "[REDACTED]"),
            )
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// SSH tunnel configuration. The tunnel is used only when `key_path` is set.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SshConfig {
    /// Path to the private key used for public-key authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,

    /// Passphrase for an encrypted private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_passphrase: Option<String>,

    /// SSH login user.
    #[serde(default)]
    pub user: String,

    /// Intermediate (bastion) host.
    #[serde(default)]
    pub host: String,

    /// SSH port (default: 22).
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// How the bastion's host key is verified (default: known_hosts).
    #[serde(default)]
    pub host_key: HostKeyPolicy,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            key_path: None,
            key_passphrase: None,
            user: String::new(),
            host: String::new(),
            port: default_ssh_port(),
            host_key: HostKeyPolicy::default(),
        }
    }
}

impl SshConfig {
    /// Whether a tunnel was requested.
    pub fn enabled(&self) -> bool {
        self.key_path.is_some()
    }
}

impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConfig")
            .field("key_path", &self.key_path)
            .field(
                "key_passphrase",
                &self.key_passphrase.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user", &self.user)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("host_key", &self.host_key)
            .finish()
    }
}

/// Server host-key trust policy for the SSH tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HostKeyPolicy {
    /// Accept only keys recorded in `~/.ssh/known_hosts`.
    #[default]
    KnownHosts,

    /// Accept only the key with this SHA256 fingerprint (base64, no prefix).
    Fingerprint(String),

    /// Accept any key. Vulnerable to man-in-the-middle attacks.
    Insecure,
}

impl FromStr for HostKeyPolicy {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "" | "known_hosts" | "known-hosts" => Ok(HostKeyPolicy::KnownHosts),
            "insecure" | "none" => Ok(HostKeyPolicy::Insecure),
            _ => match s.trim().split_once(':') {
                Some((kind, fp)) if kind.eq_ignore_ascii_case("fingerprint") => {
                    let fp = fp.trim();
                    let fp = fp.strip_prefix("SHA256:").unwrap_or(fp);
                    if fp.is_empty() {
                        return Err(MigrateError::Config(
                            "ssh.host_key fingerprint is empty".into(),
                        ));
                    }
                    Ok(HostKeyPolicy::Fingerprint(fp.to_string()))
                }
                _ => Err(MigrateError::Config(format!(
                    "Invalid ssh.host_key '{}'. Valid values: known_hosts, insecure, fingerprint:<SHA256>",
                    s
                ))),
            },
        }
    }
}

impl TryFrom<String> for HostKeyPolicy {
    type Error = MigrateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HostKeyPolicy> for String {
    fn from(policy: HostKeyPolicy) -> Self {
        policy.to_string()
    }
}

impl fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKeyPolicy::KnownHosts => write!(f, "known_hosts"),
            HostKeyPolicy::Fingerprint(fp) => write!(f, "fingerprint:{}", fp),
            HostKeyPolicy::Insecure => write!(f, "insecure"),
        }
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    /// SQLite output file (default: output.db). Replaced on every run.
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Copy table data, not only the schema (default: false).
    #[serde(default)]
    pub with_data: bool,

    /// Recreate secondary indexes on the destination (default: false).
    #[serde(default)]
    pub create_indexes: bool,

    /// Rows per destination transaction (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            with_data: false,
            create_indexes: false,
            batch_size: default_batch_size(),
        }
    }
}

/// How the source connection is reached, resolved from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionDescriptor {
    /// Explicit connection string, used as-is.
    ConnectionString,
    /// Structured fields reached through an SSH tunnel on a local port.
    Tunneled,
    /// Structured fields, connected directly.
    Direct,
}

/// Default rows per destination batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

// Default value functions for serde
fn default_localhost() -> String {
    "localhost".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_ssh_port() -> u16 {
    22
}

fn default_require() -> String {
    "require".to_string()
}

fn default_output() -> PathBuf {
    PathBuf::from("output.db")
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
