//! Column and table-creation metadata produced by the DDL parser.
//!
//! These types describe the schema as written; they know nothing about how
//! values are represented. [`crate::core::record`] resolves them into record
//! descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic type tag of a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    Bool,
    Int64,
    Float64,
    String,
    Bytes,
    Date,
    Timestamp,
    /// A type outside the supported set, kept as written.
    Other(String),
}

impl TypeTag {
    /// Resolve a SQL type name (without length or precision arguments).
    ///
    /// Matching is case-insensitive and collapses runs of whitespace, so
    /// `double  precision` and `DOUBLE PRECISION` resolve the same way.
    pub fn from_type_name(name: &str) -> Self {
        let normalized = name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();

        match normalized.as_str() {
            "BOOL" | "BOOLEAN" => TypeTag::Bool,
            "INT64" | "BIGINT" | "INT8" | "INTEGER" | "INT" | "INT4" | "SMALLINT" | "INT2"
            | "TINYINT" => TypeTag::Int64,
            "FLOAT64" | "DOUBLE" | "DOUBLE PRECISION" | "FLOAT8" | "FLOAT" | "REAL"
            | "FLOAT4" => TypeTag::Float64,
            "STRING" | "TEXT" | "VARCHAR" | "CHAR" | "CHARACTER VARYING" | "CHARACTER"
            | "BPCHAR" => TypeTag::String,
            "BYTES" | "BYTEA" | "BLOB" | "BINARY" | "VARBINARY" => TypeTag::Bytes,
            "DATE" => TypeTag::Date,
            "TIMESTAMP"
            | "TIMESTAMPTZ"
            | "TIMESTAMP WITH TIME ZONE"
            | "TIMESTAMP WITHOUT TIME ZONE"
            | "DATETIME" => TypeTag::Timestamp,
            _ => TypeTag::Other(name.trim().to_string()),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Bool => f.write_str("BOOL"),
            TypeTag::Int64 => f.write_str("INT64"),
            TypeTag::Float64 => f.write_str("FLOAT64"),
            TypeTag::String => f.write_str("STRING"),
            TypeTag::Bytes => f.write_str("BYTES"),
            TypeTag::Date => f.write_str("DATE"),
            TypeTag::Timestamp => f.write_str("TIMESTAMP"),
            TypeTag::Other(name) => f.write_str(name),
        }
    }
}

/// Declared type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnType {
    /// Element type tag (for arrays, the tag of the element).
    pub tag: TypeTag,
    /// Whether the column is an array of `tag`.
    pub is_array: bool,
}

impl ColumnType {
    /// A scalar column type.
    pub fn scalar(tag: TypeTag) -> Self {
        Self {
            tag,
            is_array: false,
        }
    }

    /// An array column type.
    pub fn array(tag: TypeTag) -> Self {
        Self { tag, is_array: true }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array {
            write!(f, "ARRAY<{}>", self.tag)
        } else {
            write!(f, "{}", self.tag)
        }
    }
}

/// One column of a table-creation statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,

    /// Declared type.
    pub column_type: ColumnType,

    /// Whether the column is declared NOT NULL (or is part of the primary key).
    pub not_null: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType, not_null: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            not_null,
        }
    }
}

/// A parsed `CREATE TABLE` statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTableStatement {
    /// Table name (unqualified).
    pub table_name: String,

    /// Columns in declaration order.
    pub columns: Vec<ColumnDefinition>,

    /// Primary key column names in key order.
    pub primary_key: Vec<String>,
}
