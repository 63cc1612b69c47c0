//! In-memory source reader for tests.

use crate::error::{MigrateError, Result};
use crate::source::{SourceReader, Table, TableScan};
use crate::value::SqlValue;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;

/// Source holding fixed tables and rows.
#[derive(Default)]
pub struct MemorySource {
    tables: Vec<Table>,
    rows: HashMap<String, Vec<Vec<SqlValue>>>,
    fail_after: HashMap<String, usize>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table and its rows.
    pub fn with_table(mut self, table: Table, rows: Vec<Vec<SqlValue>>) -> Self {
        self.rows.insert(table.name.clone(), rows);
        self.tables.push(table);
        self
    }

    /// Make the scan of `table` fail after yielding `rows` rows.
    pub fn failing_after(mut self, table: &str, rows: usize) -> Self {
        self.fail_after.insert(table.to_string(), rows);
        self
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn extract_schema(&self) -> Result<Vec<Table>> {
        let mut tables = self.tables.clone();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    async fn load_indexes(&self, _table: &mut Table) -> Result<()> {
        Ok(())
    }

    async fn scan_table(&self, table: &Table) -> Result<TableScan<'_>> {
        let rows = self.rows.get(&table.name).cloned().unwrap_or_default();
        let fail_after = self.fail_after.get(&table.name).copied();
        let name = table.name.clone();

        let mut items: Vec<Result<Vec<SqlValue>>> = Vec::new();
        for (i, row) in rows.into_iter().enumerate() {
            if fail_after == Some(i) {
                break;
            }
            items.push(Ok(row));
        }
        if fail_after.is_some() {
            items.push(Err(MigrateError::Introspection(format!(
                "connection reset while scanning {}",
                name
            ))));
        }

        Ok(TableScan {
            columns: table.columns.iter().map(|c| c.name.clone()).collect(),
            rows: stream::iter(items).boxed(),
        })
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(self) {}
}
