//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source unreachable, authentication rejected, or destination uncreatable
    #[error("Connection failed: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// SSH tunnel setup failure
    #[error("SSH tunnel error: {message}\n  Context: {context}")]
    Tunnel { message: String, context: String },

    /// Catalog query failed while reading the source schema
    #[error("Schema introspection failed: {0}")]
    Introspection(String),

    /// Creating a destination table failed; the schema phase was rolled back
    #[error("Failed to create table {table}: {message}")]
    Schema { table: String, message: String },

    /// Row scan or insert failed for a specific table
    #[error("Failed to migrate data for table {table}: {message}")]
    DataCopy { table: String, message: String },

    /// Source database query error
    #[error("Source database error: {0}")]
    Source(#[from] tokio_postgres::Error),

    /// Destination database error outside the schema and data phases
    #[error("Destination database error: {0}")]
    Destination(#[from] rusqlite::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Process exit codes, one per error class.
pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_CONNECTION_ERROR: u8 = 2;
pub const EXIT_INTROSPECTION_ERROR: u8 = 3;
pub const EXIT_SCHEMA_ERROR: u8 = 4;
pub const EXIT_DATA_COPY_ERROR: u8 = 5;
pub const EXIT_DESTINATION_ERROR: u8 = 6;
pub const EXIT_IO_ERROR: u8 = 7;

impl MigrateError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Tunnel error with context about where it occurred
    pub fn tunnel(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Tunnel {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Schema error for a table
    pub fn schema(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Schema {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a DataCopy error for a table
    pub fn data_copy(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::DataCopy {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Exit code the CLI reports for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Connection { .. } | MigrateError::Tunnel { .. } => {
                EXIT_CONNECTION_ERROR
            }
            MigrateError::Introspection(_) | MigrateError::Source(_) => EXIT_INTROSPECTION_ERROR,
            MigrateError::Schema { .. } => EXIT_SCHEMA_ERROR,
            MigrateError::DataCopy { .. } => EXIT_DATA_COPY_ERROR,
            MigrateError::Destination(_) => EXIT_DESTINATION_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
