//! Row values read from the source.

use std::string::FromUtf8Error;

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

/// A single SQLite value, owned.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    /// Raw text bytes as stored. SQLite does not enforce UTF-8, so these
    /// are kept undecoded until a target needs a string.
    Text(Vec<u8>),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Text form used when binding to PostgreSQL; `Ok(None)` for NULL.
    ///
    /// Text and blobs must be valid UTF-8; nothing is substituted.
    pub fn to_text(&self) -> Result<Option<String>, FromUtf8Error> {
        match self {
            SqlValue::Null => Ok(None),
            SqlValue::Integer(v) => Ok(Some(v.to_string())),
            SqlValue::Real(v) => Ok(Some(v.to_string())),
            SqlValue::Text(v) | SqlValue::Blob(v) => String::from_utf8(v.clone()).map(Some),
        }
    }

    /// Byte form used for `BYTEA` columns; `None` for NULL.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(v) => Some(v.to_string().into_bytes()),
            SqlValue::Real(v) => Some(v.to_string().into_bytes()),
            SqlValue::Text(v) | SqlValue::Blob(v) => Some(v.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(v) => SqlValue::Integer(v),
            ValueRef::Real(v) => SqlValue::Real(v),
            ValueRef::Text(v) => SqlValue::Text(v.to_vec()),
            ValueRef::Blob(v) => SqlValue::Blob(v.to_vec()),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            SqlValue::Null => ValueRef::Null,
            SqlValue::Integer(v) => ValueRef::Integer(*v),
            SqlValue::Real(v) => ValueRef::Real(*v),
            SqlValue::Text(v) => ValueRef::Text(v),
            SqlValue::Blob(v) => ValueRef::Blob(v),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}
