//! Source database operations.

#[cfg(test)]
pub(crate) mod memory;
mod postgres;
pub mod tls;
mod types;

pub use postgres::PgSource;
pub use types::*;

use crate::error::Result;
use crate::value::SqlValue;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Schema whose base tables are migrated.
pub const SOURCE_SCHEMA: &str = "public";

/// An open, unfiltered scan of one source table.
pub struct TableScan<'a> {
    /// Column names of the result, in result order.
    pub columns: Vec<String>,

    /// Rows in result order, one value per column.
    pub rows: BoxStream<'a, Result<Vec<SqlValue>>>,
}

/// Trait for source database operations.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Read base tables and their columns, ordered by name and ordinal position.
    async fn extract_schema(&self) -> Result<Vec<Table>>;

    /// Load non-primary key indexes for a table.
    async fn load_indexes(&self, table: &mut Table) -> Result<()>;

    /// Open a full row scan of a table.
    async fn scan_table(&self, table: &Table) -> Result<TableScan<'_>>;

    /// Test the connection.
    async fn test_connection(&self) -> Result<()>;

    /// Get the database type.
    fn db_type(&self) -> &str;

    /// Close the connection. Must complete before any tunnel is torn down.
    async fn close(self)
    where
        Self: Sized;
}
