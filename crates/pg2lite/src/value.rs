//! Row values and their coercion to SQLite storage classes.

use rusqlite::types::Value;

/// A value read from the source, already narrowed to what SQLite can hold.
///
/// Temporal, numeric, UUID and JSON values are rendered to text by the source
/// reader; booleans and raw bytes are kept as-is so [`coerce`] can decide.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Convert a source value into the value bound to the SQLite insert.
///
/// - NULL stays NULL
/// - booleans become 1/0
/// - bytes become text when [`bytes_as_text`] accepts them, otherwise a blob
/// - everything else passes through
pub fn coerce(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Integer(i64::from(b)),
        SqlValue::I64(v) => Value::Integer(v),
        SqlValue::F64(v) => Value::Real(v),
        SqlValue::Text(s) => Value::Text(s),
        SqlValue::Bytes(bytes) => match bytes_as_text(bytes) {
            Ok(text) => Value::Text(text),
            Err(bytes) => Value::Blob(bytes),
        },
    }
}

/// Heuristic text sniffing for raw bytes.
///
/// Lossy: any NUL-free, valid UTF-8 byte string is treated as text even when
/// the source column was binary. Returns the bytes unchanged when rejected.
pub fn bytes_as_text(bytes: Vec<u8>) -> std::result::Result<String, Vec<u8>> {
    if bytes.contains(&0) {
        return Err(bytes);
    }
    String::from_utf8(bytes).map_err(|e| e.into_bytes())
}
