//! SQLite destination database operations.

use crate::error::{MigrateError, Result};
use crate::identifier::{quote_ident, quote_list};
use crate::source::{Index, Table};
use crate::typemap::{pg_to_sqlite, translate_default};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// SQLite destination backed by a single file connection.
pub struct SqliteTarget {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteTarget {
    /// Create a fresh destination file, replacing any existing one.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed existing destination {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(MigrateError::connection(
                    e,
                    format!("removing existing destination {}", path.display()),
                ))
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            MigrateError::connection(e, format!("opening SQLite destination {}", path.display()))
        })?;

        let target = Self::init(conn, Some(path.to_path_buf()))?;
        info!("Created SQLite destination: {}", path.display());
        Ok(target)
    }

    /// Open an in-memory destination.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| MigrateError::connection(e, "opening in-memory SQLite destination"))?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        Ok(Self { conn, path })
    }

    /// Destination file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Underlying connection, for inspection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create every table in one transaction.
    ///
    /// A failure on any table rolls back all of them. Secondary indexes are
    /// created in the same transaction when `create_indexes` is set.
    pub fn create_tables(&mut self, tables: &[Table], create_indexes: bool) -> Result<()> {
        let tx = self.conn.transaction()?;

        for table in tables {
            let ddl = generate_ddl(table);
            debug!("DDL for {}:\n{}", table.name, ddl);
            tx.execute_batch(&ddl)
                .map_err(|e| MigrateError::schema(&table.name, e))?;

            if create_indexes {
                for idx in &table.indexes {
                    tx.execute_batch(&generate_index_ddl(table, idx))
                        .map_err(|e| {
                            MigrateError::schema(&table.name, format!("index {}: {}", idx.name, e))
                        })?;
                    debug!("Created index {} for {}", idx.name, table.name);
                }
            }

            info!("Created table: {}", table.name);
        }

        tx.commit()
            .map_err(|e| MigrateError::schema("<schema>", e))?;
        Ok(())
    }

    /// Insert one chunk of rows in its own transaction.
    ///
    /// The insert statement is prepared fresh for every chunk.
    pub fn write_chunk(&mut self, table: &str, cols: &[String], rows: Vec<Vec<Value>>) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = build_insert_sql(table, cols);
        let tx = self.conn.transaction()?;
        let mut inserted = 0u64;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                stmt.execute(params_from_iter(row))?;
                inserted += 1;
            }
        }
        tx.commit()?;

        debug!("Inserted {} rows into {}", inserted, table);
        Ok(inserted)
    }

    /// Count rows in a table.
    pub fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// Compact the destination file.
    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM")?;
        debug!("Vacuumed SQLite destination");
        Ok(())
    }

    /// Close the connection, surfacing any final error.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| MigrateError::from(e))
    }
}

/// Render the `CREATE TABLE` statement for a table.
pub fn generate_ddl(table: &Table) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|col| {
            let mut def = format!("\t{} {}", quote_ident(&col.name), pg_to_sqlite(&col.data_type));
            let default = col.default.as_deref().map(translate_default);

            match default {
                Some(d) if d.is_primary_key() => {
                    def.push(' ');
                    def.push_str(&d.clause());
                }
                Some(d) => {
                    if !col.is_nullable {
                        def.push_str(" NOT NULL");
                    }
                    def.push(' ');
                    def.push_str(&d.clause());
                }
                None => {
                    if !col.is_nullable {
                        def.push_str(" NOT NULL");
                    }
                }
            }
            def
        })
        .collect();

    format!(
        "CREATE TABLE {} (\n{}\n)",
        quote_ident(&table.name),
        columns.join(",\n")
    )
}

fn generate_index_ddl(table: &Table, idx: &Index) -> String {
    let unique = if idx.is_unique { "UNIQUE " } else { "" };
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        unique,
        quote_ident(&idx.name),
        quote_ident(&table.name),
        quote_list(&idx.columns)
    )
}

fn build_insert_sql(table: &str, cols: &[String]) -> String {
    let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        quote_list(cols),
        placeholders.join(", ")
    )
}
