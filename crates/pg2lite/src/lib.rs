//! # pg2lite
//!
//! PostgreSQL to SQLite schema and data migration library.
//!
//! This library copies the base tables of a PostgreSQL `public` schema into a
//! fresh SQLite file, with support for:
//!
//! - **SSH tunnels** through a bastion host, with host-key verification
//! - **Type and default translation** from PostgreSQL to SQLite
//! - **All-or-nothing schema creation** in a single transaction
//! - **Batched data copy** with one transaction per batch
//!
//! ## Example
//!
//! ```rust,no_run
//! use pg2lite::{Config, Migrator};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> pg2lite::Result<()> {
//!     let config = Config::load("pgmigrate.yaml")?;
//!     let mut migrator = Migrator::open(&config).await?;
//!     let result = migrator.migrate(Path::new("output.db"), true).await;
//!     migrator.close().await;
//!     println!("Migrated {} rows", result?.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod identifier;
pub mod orchestrator;
pub mod source;
pub mod target;
pub mod transfer;
pub mod tunnel;
pub mod typemap;
pub mod value;

// Re-exports for convenient access
pub use config::{Config, HostKeyPolicy, MigrationConfig, SourceConfig, SshConfig};
pub use error::{MigrateError, Result};
pub use orchestrator::{MigrationPhase, MigrationResult, Migrator, TableResult};
pub use source::{PgSource, SourceReader, Table};
pub use target::SqliteTarget;
pub use transfer::{TransferEngine, TransferStats};
pub use tunnel::Tunnel;
pub use value::SqlValue;
