//! Migration orchestrator - main workflow coordinator.
//!
//! A [`Migrator`] walks one run through its phases:
//!
//! ```text
//! Idle -> Connected -> SchemaBuilt -> [DataCopied] -> Finalized
//! ```
//!
//! `Closed` is reachable from any phase. The caller always owns `close()`,
//! which shuts the source connection before the tunnel it may run through.

use crate::config::{Config, ConnectionDescriptor};
use crate::error::Result;
use crate::source::tls::SslMode;
use crate::source::{PgSource, SourceReader};
use crate::target::SqliteTarget;
use crate::transfer::TransferEngine;
use crate::tunnel::Tunnel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where a migration run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    Idle,
    Connected,
    SchemaBuilt,
    DataCopied,
    Finalized,
    Closed,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationPhase::Idle => "idle",
            MigrationPhase::Connected => "connected",
            MigrationPhase::SchemaBuilt => "schema_built",
            MigrationPhase::DataCopied => "data_copied",
            MigrationPhase::Finalized => "finalized",
            MigrationPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Per-table outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResult {
    /// Table name.
    pub name: String,

    /// Rows copied (0 when data was not requested).
    pub rows: u64,

    /// Committed batches.
    pub batches: u64,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Destination file.
    pub destination: PathBuf,

    /// Whether row data was copied.
    pub with_data: bool,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total tables created.
    pub tables_total: usize,

    /// Total rows transferred.
    pub rows_transferred: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: u64,

    /// Per-table outcomes in creation order.
    pub tables: Vec<TableResult>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Drives one PostgreSQL to SQLite migration.
pub struct Migrator<S: SourceReader = PgSource> {
    source: S,
    tunnel: Option<Tunnel>,
    create_indexes: bool,
    engine: TransferEngine,
    phase: MigrationPhase,
}

impl Migrator<PgSource> {
    /// Connect to the source described by `config`.
    ///
    /// Establishes the SSH tunnel first when one is configured. If the
    /// database connection then fails, the tunnel is closed before the error
    /// is returned.
    pub async fn open(config: &Config) -> Result<Self> {
        config.validate()?;

        let (source, tunnel) = match config.descriptor() {
            ConnectionDescriptor::ConnectionString => {
                let pg_config = config.source.parse_connection_string()?;
                let ssl_mode = SslMode::from_pg(pg_config.get_ssl_mode());
                debug!("Connecting with explicit connection string");
                (PgSource::connect(pg_config, ssl_mode).await?, None)
            }
            ConnectionDescriptor::Tunneled => {
                let tunnel =
                    Tunnel::establish(&config.ssh, &config.source.host, config.source.port).await?;
                match connect_through(config, &tunnel).await {
                    Ok(source) => (source, Some(tunnel)),
                    Err(e) => {
                        tunnel.close().await;
                        return Err(e);
                    }
                }
            }
            ConnectionDescriptor::Direct => {
                let pg_config = config
                    .source
                    .pg_config(&config.source.host, config.source.port)?;
                let ssl_mode = config.source.ssl_mode()?;
                (PgSource::connect(pg_config, ssl_mode).await?, None)
            }
        };

        let mut migrator = Self::from_source(source, config);
        migrator.tunnel = tunnel;
        migrator.advance(MigrationPhase::Connected);
        Ok(migrator)
    }
}

async fn connect_through(config: &Config, tunnel: &Tunnel) -> Result<PgSource> {
    let local = tunnel.local_addr();
    let pg_config = config
        .source
        .pg_config(&local.ip().to_string(), local.port())?;
    PgSource::connect(pg_config, config.source.ssl_mode()?).await
}

impl<S: SourceReader> Migrator<S> {
    /// Wrap an already-connected source.
    pub fn from_source(source: S, config: &Config) -> Self {
        Self {
            source,
            tunnel: None,
            create_indexes: config.migration.create_indexes,
            engine: TransferEngine::new(config.migration.batch_size),
            phase: MigrationPhase::Idle,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    /// Whether the source is reached through an SSH tunnel.
    pub fn is_tunneled(&self) -> bool {
        self.tunnel.is_some()
    }

    fn advance(&mut self, phase: MigrationPhase) {
        debug!("Migration phase: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Re-check that the source answers queries.
    pub async fn validate(&self) -> Result<()> {
        self.source.test_connection().await
    }

    /// Build `dest` from the source schema, optionally copying all rows.
    ///
    /// Any existing file at `dest` is replaced. The schema is created
    /// all-or-nothing; row data is committed batch by batch, so a data copy
    /// failure leaves earlier tables and batches in place.
    pub async fn migrate(&mut self, dest: &Path, with_data: bool) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);

        let mut target = SqliteTarget::create(dest)?;

        info!("Extracting schema from {} source", self.source.db_type());
        let mut tables = self.source.extract_schema().await?;
        if self.create_indexes {
            for table in &mut tables {
                self.source.load_indexes(table).await?;
            }
        }
        info!("Found {} tables to migrate", tables.len());

        target.create_tables(&tables, self.create_indexes)?;
        self.advance(MigrationPhase::SchemaBuilt);

        let mut results: Vec<TableResult> = tables
            .iter()
            .map(|t| TableResult {
                name: t.name.clone(),
                rows: 0,
                batches: 0,
            })
            .collect();

        if with_data {
            for (table, result) in tables.iter().zip(results.iter_mut()) {
                let stats = self
                    .engine
                    .copy_table(&self.source, &mut target, table)
                    .await?;
                result.rows = stats.rows;
                result.batches = stats.batches;
            }
            self.advance(MigrationPhase::DataCopied);
        }

        target.vacuum()?;
        target.close()?;
        self.advance(MigrationPhase::Finalized);

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let rows_transferred: u64 = results.iter().map(|r| r.rows).sum();
        let rows_per_second = if duration > 0.0 {
            (rows_transferred as f64 / duration) as u64
        } else {
            0
        };

        let result = MigrationResult {
            run_id,
            destination: dest.to_path_buf(),
            with_data,
            duration_seconds: duration,
            started_at,
            completed_at,
            tables_total: tables.len(),
            rows_transferred,
            rows_per_second,
            tables: results,
        };

        info!(
            "Migration completed: {} tables, {} rows in {:.1}s ({} rows/s)",
            result.tables_total,
            result.rows_transferred,
            result.duration_seconds,
            result.rows_per_second
        );

        Ok(result)
    }

    /// Close the source connection, then the tunnel.
    pub async fn close(mut self) {
        self.advance(MigrationPhase::Closed);
        let tunnel = self.tunnel.take();
        self.source.close().await;
        if let Some(tunnel) = tunnel {
            tunnel.close().await;
        }
        info!("Migrator closed");
    }
}

impl<S: SourceReader> fmt::Debug for Migrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migrator")
            .field("source", &self.source.db_type())
            .field("tunneled", &self.tunnel.is_some())
            .field("phase", &self.phase)
            .finish()
    }
}
