//! Scalar value types carried by records and mutations.
//!
//! Every supported column resolves to one [`ScalarType`]; a [`Value`] is one
//! instance of it, or a typed NULL so the store can still bind the parameter
//! with the right SQL type.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The scalar kinds a column can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Bool,
    Int64,
    Float64,
    String,
    Bytes,
    Date,
    Timestamp,
}

impl ScalarType {
    /// The zero value of this scalar, used for non-nullable fields with no input.
    #[must_use]
    pub fn zero_value(self) -> Value {
        match self {
            ScalarType::Bool => Value::Bool(false),
            ScalarType::Int64 => Value::Int64(0),
            ScalarType::Float64 => Value::Float64(0.0),
            ScalarType::String => Value::String(String::new()),
            ScalarType::Bytes => Value::Bytes(Vec::new()),
            ScalarType::Date => Value::Date(NaiveDate::default()),
            ScalarType::Timestamp => Value::Timestamp(DateTime::<Utc>::default()),
        }
    }

    /// PostgreSQL type used when binding a parameter of this scalar.
    pub fn pg_cast(self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int64 => "int8",
            ScalarType::Float64 => "float8",
            ScalarType::String => "text",
            ScalarType::Bytes => "bytea",
            ScalarType::Date => "date",
            ScalarType::Timestamp => "timestamptz",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Bool => "BOOL",
            ScalarType::Int64 => "INT64",
            ScalarType::Float64 => "FLOAT64",
            ScalarType::String => "STRING",
            ScalarType::Bytes => "BYTES",
            ScalarType::Date => "DATE",
            ScalarType::Timestamp => "TIMESTAMP",
        };
        f.write_str(name)
    }
}

/// One field value of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value with its scalar type for parameter binding.
    Null(ScalarType),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// The scalar type of this value, including for typed NULLs.
    #[must_use]
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Value::Null(t) => *t,
            Value::Bool(_) => ScalarType::Bool,
            Value::Int64(_) => ScalarType::Int64,
            Value::Float64(_) => ScalarType::Float64,
            Value::String(_) => ScalarType::String,
            Value::Bytes(_) => ScalarType::Bytes,
            Value::Date(_) => ScalarType::Date,
            Value::Timestamp(_) => ScalarType::Timestamp,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}
