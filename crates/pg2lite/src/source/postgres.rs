//! PostgreSQL source database operations.

use crate::error::{MigrateError, Result};
use crate::identifier::quote_ident;
use crate::source::tls::{self, SslMode};
use crate::source::{Column, Index, SourceReader, Table, TableScan, SOURCE_SCHEMA};
use crate::value::SqlValue;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_postgres::config::SslMode as PgSslMode;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::types::{Date, Timestamp, Type};
use tokio_postgres::{Client, Config as PgConfig, NoTls, Row, Socket};
use tracing::{debug, info, warn};

/// PostgreSQL source backed by a single connection.
pub struct PgSource {
    client: Client,
    connection: JoinHandle<()>,
}

impl PgSource {
    /// Connect and validate with `SELECT 1`.
    pub async fn connect(mut pg_config: PgConfig, ssl_mode: SslMode) -> Result<Self> {
        let (client, connection) = match tls::connector(ssl_mode)? {
            Some(connector) => {
                if pg_config.get_ssl_mode() == PgSslMode::Disable {
                    pg_config.ssl_mode(PgSslMode::Require);
                }
                spawn_connection(&pg_config, connector).await?
            }
            None => {
                pg_config.ssl_mode(PgSslMode::Disable);
                spawn_connection(&pg_config, NoTls).await?
            }
        };

        let source = Self { client, connection };
        source
            .client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(e, "validating PostgreSQL source connection"))?;

        info!(
            "Connected to PostgreSQL source: {:?}/{}",
            pg_config.get_hosts(),
            pg_config.get_dbname().unwrap_or_default()
        );

        Ok(source)
    }

    /// Load columns for a table.
    async fn load_columns(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT
                column_name::text,
                data_type::text,
                is_nullable::text,
                column_default::text,
                ordinal_position::int4
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;

        let rows = self
            .client
            .query(query, &[&SOURCE_SCHEMA, &table.name])
            .await
            .map_err(|e| introspection_error(e, &table.name))?;

        table.columns = columns_from_catalog(rows.iter().map(|row| -> CatalogColumn {
            (row.get(0), row.get(1), row.get(2), row.get(3), row.get(4))
        }));

        debug!("Loaded {} columns for {}", table.columns.len(), table.name);
        Ok(())
    }
}

async fn spawn_connection<T>(pg_config: &PgConfig, tls: T) -> Result<(Client, JoinHandle<()>)>
where
    T: MakeTlsConnect<Socket> + Send + 'static,
    T::Stream: Send + 'static,
    T::TlsConnect: Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let (client, connection) = pg_config
        .connect(tls)
        .await
        .map_err(|e| MigrateError::connection(e, "connecting to PostgreSQL source"))?;

    let handle = tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("PostgreSQL source connection closed with error: {}", e);
        }
    });

    Ok((client, handle))
}

/// One `information_schema.columns` row: name, data type, `is_nullable`,
/// default expression and ordinal position.
type CatalogColumn = (String, String, String, Option<String>, i32);

/// Build column descriptors from catalog rows, in ordinal order.
fn columns_from_catalog<I>(rows: I) -> Vec<Column>
where
    I: IntoIterator<Item = CatalogColumn>,
{
    let mut columns: Vec<Column> = rows
        .into_iter()
        .map(|(name, data_type, is_nullable, default, ordinal_pos)| Column {
            name,
            data_type,
            is_nullable: is_nullable.eq_ignore_ascii_case("YES"),
            default,
            ordinal_pos,
        })
        .collect();
    columns.sort_by_key(|c| c.ordinal_pos);
    columns
}

/// `"public"."name"`, so a same-named table earlier in `search_path` is never read.
fn qualified_table(name: &str) -> String {
    format!("{}.{}", quote_ident(SOURCE_SCHEMA), quote_ident(name))
}

fn introspection_error(e: tokio_postgres::Error, table: &str) -> MigrateError {
    MigrateError::Introspection(format!("reading columns of {}: {}", table, e))
}

#[async_trait]
impl SourceReader for PgSource {
    async fn extract_schema(&self) -> Result<Vec<Table>> {
        let query = r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = $1
              AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;

        let rows = self
            .client
            .query(query, &[&SOURCE_SCHEMA])
            .await
            .map_err(|e| MigrateError::Introspection(format!("listing tables: {}", e)))?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let mut table = Table::new(row.get::<_, String>(0), Vec::new());
            self.load_columns(&mut table).await?;
            tables.push(table);
        }

        info!(
            "Extracted {} tables from schema '{}'",
            tables.len(),
            SOURCE_SCHEMA
        );
        Ok(tables)
    }

    async fn load_indexes(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT
                i.relname::text AS index_name,
                ix.indisunique,
                array_agg(a.attname::text ORDER BY array_position(ix.indkey, a.attnum)) AS columns
            FROM pg_catalog.pg_index ix
            JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
            JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
            WHERE n.nspname = $1
              AND t.relname = $2
              AND NOT ix.indisprimary
            GROUP BY i.relname, ix.indisunique
            ORDER BY i.relname
        "#;

        let rows = self
            .client
            .query(query, &[&SOURCE_SCHEMA, &table.name])
            .await
            .map_err(|e| {
                MigrateError::Introspection(format!("reading indexes of {}: {}", table.name, e))
            })?;

        for row in rows {
            table.indexes.push(Index {
                name: row.get(0),
                is_unique: row.get(1),
                columns: row.get(2),
            });
        }

        debug!("Loaded {} indexes for {}", table.indexes.len(), table.name);
        Ok(())
    }

    async fn scan_table(&self, table: &Table) -> Result<TableScan<'_>> {
        let from = qualified_table(&table.name);
        let described = self
            .client
            .prepare(&format!("SELECT * FROM {}", from))
            .await?;

        let columns: Vec<String> = described
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let kinds: Vec<ValueKind> = described
            .columns()
            .iter()
            .map(|c| ValueKind::of(c.type_()))
            .collect();

        // Types without a native decoder are read through their text form
        let statement = if kinds.contains(&ValueKind::Text) {
            let projection = columns
                .iter()
                .zip(&kinds)
                .map(|(name, kind)| match kind {
                    ValueKind::Text => format!("{0}::text AS {0}", quote_ident(name)),
                    _ => quote_ident(name),
                })
                .collect::<Vec<_>>()
                .join(", ");
            self.client
                .prepare(&format!("SELECT {} FROM {}", projection, from))
                .await?
        } else {
            described
        };

        let rows = self
            .client
            .query_raw(&statement, std::iter::empty::<i32>())
            .await?;

        let rows = rows
            .map(move |row| {
                let row = row?;
                kinds
                    .iter()
                    .enumerate()
                    .map(|(idx, kind)| decode(&row, idx, *kind).map_err(MigrateError::from))
                    .collect::<Result<Vec<_>>>()
            })
            .boxed();

        Ok(TableScan { columns, rows })
    }

    async fn test_connection(&self) -> Result<()> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(e, "testing PostgreSQL source connection"))?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(self) {
        // Dropping the client ends the connection task
        drop(self.client);
        if let Err(e) = self.connection.await {
            warn!("PostgreSQL connection task failed: {}", e);
        }
        debug!("PostgreSQL source connection closed");
    }
}

/// How a result column is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Bytea,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Uuid,
    Json,
    /// Read as text; non-text types are cast with `::text` in the select list.
    Text,
}

impl ValueKind {
    fn of(ty: &Type) -> Self {
        let native = [
            (Type::BOOL, ValueKind::Bool),
            (Type::INT2, ValueKind::Int2),
            (Type::INT4, ValueKind::Int4),
            (Type::INT8, ValueKind::Int8),
            (Type::FLOAT4, ValueKind::Float4),
            (Type::FLOAT8, ValueKind::Float8),
            (Type::BYTEA, ValueKind::Bytea),
            (Type::TIMESTAMP, ValueKind::Timestamp),
            (Type::TIMESTAMPTZ, ValueKind::TimestampTz),
            (Type::DATE, ValueKind::Date),
            (Type::TIME, ValueKind::Time),
            (Type::UUID, ValueKind::Uuid),
            (Type::JSON, ValueKind::Json),
            (Type::JSONB, ValueKind::Json),
        ];

        native
            .iter()
            .find(|(t, _)| t == ty)
            .map(|(_, kind)| *kind)
            .unwrap_or(ValueKind::Text)
    }
}

/// Convert a PostgreSQL row value to SqlValue based on its decode kind.
fn decode(
    row: &Row,
    idx: usize,
    kind: ValueKind,
) -> std::result::Result<SqlValue, tokio_postgres::Error> {
    let value = match kind {
        ValueKind::Bool => row.try_get::<_, Option<bool>>(idx)?.map(SqlValue::Bool),
        ValueKind::Int2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| SqlValue::I64(v.into())),
        ValueKind::Int4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| SqlValue::I64(v.into())),
        ValueKind::Int8 => row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::I64),
        ValueKind::Float4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| SqlValue::F64(widen_real(v))),
        ValueKind::Float8 => row.try_get::<_, Option<f64>>(idx)?.map(SqlValue::F64),
        ValueKind::Bytea => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(SqlValue::Bytes),
        ValueKind::Timestamp => row
            .try_get::<_, Option<Timestamp<chrono::NaiveDateTime>>>(idx)?
            .map(|v| SqlValue::Text(timestamp_text(v))),
        ValueKind::TimestampTz => row
            .try_get::<_, Option<Timestamp<chrono::DateTime<chrono::Utc>>>>(idx)?
            .map(|v| SqlValue::Text(timestamptz_text(v))),
        ValueKind::Date => row
            .try_get::<_, Option<Date<chrono::NaiveDate>>>(idx)?
            .map(|v| SqlValue::Text(date_text(v))),
        ValueKind::Time => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)?
            .map(|v| SqlValue::Text(v.format("%H:%M:%S%.f").to_string())),
        ValueKind::Uuid => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map(|v| SqlValue::Text(v.to_string())),
        ValueKind::Json => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(|v| SqlValue::Text(v.to_string())),
        ValueKind::Text => row.try_get::<_, Option<String>>(idx)?.map(SqlValue::Text),
    };

    Ok(value.unwrap_or(SqlValue::Null))
}

/// Widen a `real` through its shortest decimal form, so 1.1 stays 1.1
/// rather than becoming 1.100000023841858.
fn widen_real(v: f32) -> f64 {
    v.to_string().parse().unwrap_or_else(|_| f64::from(v))
}

fn timestamp_text(value: Timestamp<chrono::NaiveDateTime>) -> String {
    match value {
        Timestamp::PosInfinity => "infinity".to_string(),
        Timestamp::NegInfinity => "-infinity".to_string(),
        Timestamp::Value(v) => v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
    }
}

fn timestamptz_text(value: Timestamp<chrono::DateTime<chrono::Utc>>) -> String {
    match value {
        Timestamp::PosInfinity => "infinity".to_string(),
        Timestamp::NegInfinity => "-infinity".to_string(),
        Timestamp::Value(v) => v.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string(),
    }
}

fn date_text(value: Date<chrono::NaiveDate>) -> String {
    match value {
        Date::PosInfinity => "infinity".to_string(),
        Date::NegInfinity => "-infinity".to_string(),
        Date::Value(v) => v.format("%Y-%m-%d").to_string(),
    }
}
