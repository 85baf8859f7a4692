//! Per-namespace relational storage for decoded telemetry.

mod sql_guard;
mod table_store;

use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::ToSql;
use serde::Serialize;
use thiserror::Error;

use crate::telemetry::Scalar;

pub use table_store::{
    sanitize_identifier, CancelFlag, FailedTable, IngestReport, Namespace, QueryRows, TableStore,
    DEFAULT_BATCH_ROWS,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid namespace id: {0}")]
    InvalidNamespace(String),
}

/// Why a statement could not produce rows. The display text is what the
/// reasoning agent sees.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum QueryFailure {
    #[error("the statement is empty")]
    Empty,

    #[error("syntax error: {0}")]
    Parse(String),

    #[error("only a single read-only SELECT statement is allowed: {0}")]
    NotReadOnly(String),

    #[error("no such table: {0}")]
    UnknownTable(String),

    #[error("{0}")]
    Engine(String),

    #[error("query was interrupted")]
    Interrupted,
}

impl From<rusqlite::Error> for QueryFailure {
    fn from(err: rusqlite::Error) -> Self {
        if err.sqlite_error_code() == Some(rusqlite::ErrorCode::OperationInterrupted) {
            QueryFailure::Interrupted
        } else {
            QueryFailure::Engine(err.to_string())
        }
    }
}

impl ToSql for Scalar {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Scalar::Null => ToSqlOutput::Owned(Value::Null),
            Scalar::Bool(v) => ToSqlOutput::Owned(Value::Integer(*v as i64)),
            Scalar::Int(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            Scalar::Float(v) => ToSqlOutput::Owned(Value::Real(*v)),
            Scalar::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

impl From<ValueRef<'_>> for Scalar {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Scalar::Null,
            ValueRef::Integer(v) => Scalar::Int(v),
            ValueRef::Real(v) => Scalar::Float(v),
            ValueRef::Text(v) => Scalar::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => Scalar::Text(format!("<blob {} bytes>", v.len())),
        }
    }
}
