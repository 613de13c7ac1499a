//! # tabledump
//!
//! Schema-driven bulk export and import of relational tables as JSON lines.
//!
//! The record shape of every table is derived at runtime from the store's
//! DDL. Export scans each table and writes one JSON object per row; import
//! decodes the lines back into records and upserts them through a bounded
//! mutation buffer that applies atomic groups.
//!
//! - **Schema catalog** built from `CREATE TABLE` statements
//! - **JSON lines codec** driven by per-table record descriptors
//! - **Directory or `.tar.gz` output**
//! - **Batched upserts** with a configurable group size
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tabledump::{Config, ExportOptions, Exporter, PostgresStore};
//!
//! #[tokio::main]
//! async fn main() -> tabledump::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let store = Arc::new(PostgresStore::connect(&config.store).await?);
//!     let exporter = Exporter::new(
//!         store,
//!         ExportOptions {
//!             output: config.export.output.clone(),
//!             compress: config.export.compress,
//!             tables: config.export.tables.clone(),
//!         },
//!     );
//!     let result = exporter.run().await?;
//!     println!("Exported {} rows", result.rows_written);
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod core;
pub mod ddl;
pub mod error;
pub mod export;
pub mod import;
pub mod sink;
pub mod store;
pub mod stream;

// Re-exports for convenient access
pub use buffer::MutationBuffer;
pub use catalog::Catalog;
pub use config::{Config, ExportConfig, ImportConfig, StoreConfig};
pub use core::{Record, RecordDescriptor, ScalarType, TableDefinition, Value};
pub use error::{DumpError, Result};
pub use export::{ExportOptions, ExportResult, Exporter};
pub use import::{ImportResult, Importer};
pub use sink::Sink;
pub use store::{MemoryStore, Mutation, PostgresStore, Store};
pub use stream::{stream_table, StreamStats};
