//! Decoded telemetry records.
//!
//! A record is schema-less: a type tag plus an ordered list of named scalar
//! values. The layout of each record type is only known at runtime, from the
//! format definitions embedded in the log itself.

use serde::Serialize;

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Unsigned values that do not fit in an `i64` degrade to floats.
    pub fn from_u64(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(v) => Scalar::Int(v),
            Err(_) => Scalar::Float(value as f64),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// SQLite column affinity used when a column is first created.
    pub fn sql_type(&self) -> &'static str {
        match self {
            Scalar::Null => "",
            Scalar::Bool(_) | Scalar::Int(_) => "INTEGER",
            Scalar::Float(_) => "REAL",
            Scalar::Text(_) => "TEXT",
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

/// One decoded telemetry message.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub type_tag: String,
    pub fields: Vec<(String, Scalar)>,
}

impl Record {
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_capacity(type_tag: impl Into<String>, capacity: usize) -> Self {
        Self {
            type_tag: type_tag.into(),
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Append a field. A repeated name overwrites the earlier value.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Scalar>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}
