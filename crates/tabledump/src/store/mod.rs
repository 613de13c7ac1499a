//! Store abstraction: schema DDL, full-table reads and atomic mutation groups.
//!
//! - [`Store`]: the contract the catalog, streamer and buffer are written against
//! - [`PostgresStore`]: PostgreSQL backend over a deadpool connection pool
//! - [`MemoryStore`]: in-memory backend for tests and offline runs

mod memory;
mod postgres;
mod tls;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use tls::{SslMode, TlsBuilder};

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::codec;
use crate::core::record::{Record, RecordDescriptor, TableDefinition};
use crate::core::value::Value;
use crate::error::Result;

/// Stream of records produced by a full-table scan.
///
/// An item-level [`crate::DumpError::RowConversion`] means one row could not be
/// converted and the scan continues; any other item error ends the scan.
pub type RowStream = BoxStream<'static, Result<Record>>;

/// One insert-or-update operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// Target table.
    pub table: String,

    /// Column names, in the order of `values`.
    pub columns: Vec<String>,

    /// Primary key columns used as the conflict target.
    pub primary_key: Vec<String>,

    /// Values, positionally matching `columns`.
    pub values: Vec<Value>,
}

impl Mutation {
    /// Build the upsert for one record of `table`.
    pub fn insert_or_update(table: &TableDefinition, record: &Record) -> Self {
        Self {
            table: table.name.clone(),
            columns: codec::columns_of(&table.descriptor),
            primary_key: table.primary_key.clone(),
            values: codec::values_of(record, &table.descriptor),
        }
    }
}

/// A relational store that can describe, scan and write its tables.
#[async_trait]
pub trait Store: Send + Sync {
    /// DDL statements describing every table, in creation order.
    async fn database_ddl(&self) -> Result<Vec<String>>;

    /// Run a read-only query and stream the rows as records of `descriptor`.
    async fn query(&self, sql: &str, descriptor: &RecordDescriptor) -> Result<RowStream>;

    /// Apply a group of mutations atomically: all of them or none.
    async fn apply(&self, mutations: &[Mutation]) -> Result<()>;

    /// Backend identifier (e.g. "postgres").
    fn store_type(&self) -> &str;
}
