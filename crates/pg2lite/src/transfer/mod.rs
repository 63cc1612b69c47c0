//! Chunked table copy from the source reader into the SQLite destination.
//!
//! Rows are pulled from the source stream into a chunk of `batch_size`
//! values, then the chunk is written synchronously in its own destination
//! transaction. No destination borrow is held while awaiting the source.

use crate::config::DEFAULT_BATCH_SIZE;
use crate::error::{MigrateError, Result};
use crate::source::{SourceReader, Table, TableScan};
use crate::target::SqliteTarget;
use crate::value::coerce;
use futures::StreamExt;
use rusqlite::types::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Statistics from copying one table.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    /// Total rows written.
    pub rows: u64,

    /// Committed batches.
    pub batches: u64,

    /// Time spent waiting on the source.
    pub scan_time: Duration,

    /// Time spent writing to the destination.
    pub write_time: Duration,
}

/// Copies tables one at a time in fixed-size batches.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    batch_size: usize,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl TransferEngine {
    /// Create an engine writing `batch_size` rows per transaction.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Copy every row of `table`.
    ///
    /// Each full batch is committed as soon as it is read; the final partial
    /// batch is committed when the scan ends. On error the in-progress batch
    /// is discarded and earlier batches stay committed.
    pub async fn copy_table<S: SourceReader>(
        &self,
        source: &S,
        target: &mut SqliteTarget,
        table: &Table,
    ) -> Result<TransferStats> {
        let started = Instant::now();
        let TableScan { columns, mut rows } = source
            .scan_table(table)
            .await
            .map_err(|e| MigrateError::data_copy(&table.name, e))?;

        let mut stats = TransferStats::default();
        let mut chunk: Vec<Vec<Value>> = Vec::with_capacity(self.batch_size);
        let mut scan_started = Instant::now();

        while let Some(row) = rows.next().await {
            let row = row.map_err(|e| MigrateError::data_copy(&table.name, e))?;
            chunk.push(row.into_iter().map(coerce).collect());

            if chunk.len() >= self.batch_size {
                stats.scan_time += scan_started.elapsed();
                let batch = std::mem::replace(&mut chunk, Vec::with_capacity(self.batch_size));
                self.write_batch(target, table, &columns, batch, &mut stats)?;
                scan_started = Instant::now();
            }
        }
        stats.scan_time += scan_started.elapsed();

        if !chunk.is_empty() {
            self.write_batch(target, table, &columns, chunk, &mut stats)?;
        }

        info!("Migrated data for table: {}", table.name);
        debug!(
            "{}: {} rows in {} batches ({:?} total, scan {:?}, write {:?})",
            table.name,
            stats.rows,
            stats.batches,
            started.elapsed(),
            stats.scan_time,
            stats.write_time
        );

        Ok(stats)
    }

    fn write_batch(
        &self,
        target: &mut SqliteTarget,
        table: &Table,
        columns: &[String],
        batch: Vec<Vec<Value>>,
        stats: &mut TransferStats,
    ) -> Result<()> {
        let write_started = Instant::now();
        let written = target
            .write_chunk(&table.name, columns, batch)
            .map_err(|e| MigrateError::data_copy(&table.name, e))?;
        stats.write_time += write_started.elapsed();
        stats.rows += written;
        stats.batches += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::memory::MemorySource;
    use crate::source::Column;
    use crate::value::SqlValue;

    fn events() -> Table {
        Table::new(
            "events",
            vec![
                Column::new("id", "integer", false),
                Column::new("flag", "boolean", true),
                Column::new("note", "text", true),
            ],
        )
    }

    fn rows(n: i64) -> Vec<Vec<SqlValue>> {
        (1..=n)
            .map(|i| {
                vec![
                    SqlValue::I64(i),
                    SqlValue::Bool(i % 2 == 0),
                    if i % 3 == 0 {
                        SqlValue::Null
                    } else {
                        SqlValue::Text(format!("row {}", i))
                    },
                ]
            })
            .collect()
    }

    fn target_with(table: &Table) -> SqliteTarget {
        let mut target = SqliteTarget::open_in_memory().unwrap();
        target.create_tables(std::slice::from_ref(table), false).unwrap();
        target
    }

    #[tokio::test]
    async fn test_batches_of_default_size() {
        let table = events();
        let source = MemorySource::new().with_table(table.clone(), rows(2500));
        let mut target = target_with(&table);

        let stats = TransferEngine::default()
            .copy_table(&source, &mut target, &table)
            .await
            .unwrap();

        assert_eq!(stats.rows, 2500);
        assert_eq!(stats.batches, 3);
        assert_eq!(target.row_count("events").unwrap(), 2500);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_empty_batch() {
        let table = events();
        let source = MemorySource::new().with_table(table.clone(), rows(20));
        let mut target = target_with(&table);

        let stats = TransferEngine::new(10)
            .copy_table(&source, &mut target, &table)
            .await
            .unwrap();
        assert_eq!(stats.batches, 2);
    }

    #[tokio::test]
    async fn test_empty_table() {
        let table = events();
        let source = MemorySource::new().with_table(table.clone(), Vec::new());
        let mut target = target_with(&table);

        let stats = TransferEngine::default()
            .copy_table(&source, &mut target, &table)
            .await
            .unwrap();
        assert_eq!(stats.rows, 0);
        assert_eq!(stats.batches, 0);
    }

    #[tokio::test]
    async fn test_values_are_coerced() {
        let table = events();
        let source = MemorySource::new().with_table(table.clone(), rows(3));
        let mut target = target_with(&table);

        TransferEngine::default()
            .copy_table(&source, &mut target, &table)
            .await
            .unwrap();

        let (flag, note): (i64, Option<String>) = target
            .connection()
            .query_row("SELECT flag, note FROM events WHERE id = 2", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(flag, 1);
        assert_eq!(note.as_deref(), Some("row 2"));

        let note: Option<String> = target
            .connection()
            .query_row("SELECT note FROM events WHERE id = 3", [], |row| row.get(0))
            .unwrap();
        assert!(note.is_none());
    }

    #[tokio::test]
    async fn test_scan_error_keeps_committed_batches() {
        let table = events();
        let source = MemorySource::new()
            .with_table(table.clone(), rows(25))
            .failing_after("events", 15);
        let mut target = target_with(&table);

        let err = TransferEngine::new(10)
            .copy_table(&source, &mut target, &table)
            .await
            .unwrap_err();

        assert!(matches!(&err, MigrateError::DataCopy { table, .. } if table == "events"));
        assert_eq!(err.exit_code(), 5);
        assert_eq!(target.row_count("events").unwrap(), 10);
    }

    #[tokio::test]
    async fn test_insert_error_names_table() {
        let table = events();
        let bad_rows = vec![vec![SqlValue::Null, SqlValue::Bool(true), SqlValue::Null]];
        let source = MemorySource::new().with_table(table.clone(), bad_rows);
        let mut target = target_with(&table);

        let err = TransferEngine::default()
            .copy_table(&source, &mut target, &table)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("events"));
        assert_eq!(target.row_count("events").unwrap(), 0);
    }
}
