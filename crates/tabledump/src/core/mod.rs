//! Core record model shared by export and import.
//!
//! - [`schema`]: column and table-creation metadata as parsed from DDL
//! - [`value`]: scalar types and field values
//! - [`record`]: record descriptors, records and the descriptor builder
//! - [`identifier`]: identifier quoting for generated SQL

pub mod identifier;
pub mod record;
pub mod schema;
pub mod value;

pub use record::{
    build_descriptor, FieldDescriptor, FieldRepr, Record, RecordDescriptor, TableDefinition,
};
pub use schema::{ColumnDefinition, ColumnType, CreateTableStatement, TypeTag};
pub use value::{ScalarType, Value};
