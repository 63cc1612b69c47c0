//! Type mapping between PostgreSQL and SQLite.

mod defaults;

pub use defaults::{translate_default, ColumnDefault, DefaultRule, DEFAULT_RULES};

use std::fmt;

/// SQLite column type emitted for a migrated column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqliteType {
    Integer,
    Real,
    Boolean,
    DateTime,
    Date,
    Text,
    Blob,
}

impl SqliteType {
    /// Type name as written in `CREATE TABLE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SqliteType::Integer => "INTEGER",
            SqliteType::Real => "REAL",
            SqliteType::Boolean => "BOOLEAN",
            SqliteType::DateTime => "DATETIME",
            SqliteType::Date => "DATE",
            SqliteType::Text => "TEXT",
            SqliteType::Blob => "BLOB",
        }
    }
}

impl fmt::Display for SqliteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a PostgreSQL data type to SQLite.
pub fn pg_to_sqlite(pg_type: &str) -> SqliteType {
    match pg_type.trim().to_lowercase().as_str() {
        // Integer types
        "integer" | "int" | "int2" | "int4" | "int8" | "smallint" | "bigint" | "serial"
        | "serial4" | "smallserial" | "serial2" | "bigserial" | "serial8" => SqliteType::Integer,

        // Floating point, decimal and money
        "real" | "float4" | "double precision" | "float8" | "numeric" | "decimal" | "money" => {
            SqliteType::Real
        }

        // Boolean
        "boolean" | "bool" => SqliteType::Boolean,

        // Date/time types
        "timestamp" | "timestamp without time zone" | "timestamp with time zone"
        | "timestamptz" => SqliteType::DateTime,
        "date" => SqliteType::Date,
        "time" | "time without time zone" | "time with time zone" | "timetz" => SqliteType::Text,

        // Binary
        "bytea" => SqliteType::Blob,

        // Documents, identifiers, network addresses and geometry are stored as text
        "json" | "jsonb" | "uuid" | "inet" | "cidr" | "macaddr" | "macaddr8" | "point"
        | "line" | "lseg" | "polygon" | "box" | "circle" | "path" => SqliteType::Text,

        // Default fallback
        _ => SqliteType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_types() {
        assert_eq!(pg_to_sqlite("integer"), SqliteType::Integer);
        assert_eq!(pg_to_sqlite("bigint"), SqliteType::Integer);
        assert_eq!(pg_to_sqlite("smallint"), SqliteType::Integer);
        assert_eq!(pg_to_sqlite("bigserial"), SqliteType::Integer);
    }

    #[test]
    fn test_numeric_types() {
        assert_eq!(pg_to_sqlite("double precision"), SqliteType::Real);
        assert_eq!(pg_to_sqlite("numeric"), SqliteType::Real);
        assert_eq!(pg_to_sqlite("money"), SqliteType::Real);
    }

    #[test]
    fn test_datetime_types() {
        assert_eq!(pg_to_sqlite("timestamp without time zone"), SqliteType::DateTime);
        assert_eq!(pg_to_sqlite("timestamp with time zone"), SqliteType::DateTime);
        assert_eq!(pg_to_sqlite("date"), SqliteType::Date);
        assert_eq!(pg_to_sqlite("time with time zone"), SqliteType::Text);
    }

    #[test]
    fn test_special_types() {
        assert_eq!(pg_to_sqlite("boolean"), SqliteType::Boolean);
        assert_eq!(pg_to_sqlite("bytea"), SqliteType::Blob);
        assert_eq!(pg_to_sqlite("jsonb"), SqliteType::Text);
        assert_eq!(pg_to_sqlite("uuid"), SqliteType::Text);
        assert_eq!(pg_to_sqlite("inet"), SqliteType::Text);
        assert_eq!(pg_to_sqlite("polygon"), SqliteType::Text);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(pg_to_sqlite("BIGINT"), SqliteType::Integer);
        assert_eq!(pg_to_sqlite("Timestamp With Time Zone"), SqliteType::DateTime);
    }

    #[test]
    fn test_unknown_types_fall_back_to_text() {
        assert_eq!(pg_to_sqlite("USER-DEFINED"), SqliteType::Text);
        assert_eq!(pg_to_sqlite("ARRAY"), SqliteType::Text);
        assert_eq!(pg_to_sqlite("character varying"), SqliteType::Text);
        assert_eq!(pg_to_sqlite(""), SqliteType::Text);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(SqliteType::DateTime.to_string(), "DATETIME");
        assert_eq!(SqliteType::Blob.as_str(), "BLOB");
    }
}
