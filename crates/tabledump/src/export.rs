//! Export driver: every selected table to one JSON lines entry of a sink.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::error::Result;
use crate::sink::Sink;
use crate::store::Store;
use crate::stream::stream_table;

/// What to export and where.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Output directory, or archive path when `compress` is set.
    pub output: PathBuf,

    /// Write a `.tar.gz` archive instead of a directory.
    pub compress: bool,

    /// Exact table names to export; empty exports every table.
    pub tables: Vec<String>,
}

/// Summary of an export run.
#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub status: String,
    pub duration_seconds: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// Directory or archive that was written.
    pub output: String,

    pub tables_total: usize,
    pub tables_success: usize,
    pub tables_failed: usize,
    pub rows_written: u64,
    pub rows_skipped: u64,
    pub failed_tables: Vec<String>,
}

impl ExportResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs an export against one store.
pub struct Exporter {
    store: Arc<dyn Store>,
    options: ExportOptions,
}

impl Exporter {
    pub fn new(store: Arc<dyn Store>, options: ExportOptions) -> Self {
        Self { store, options }
    }

    /// Export the selected tables.
    ///
    /// Schema and sink failures abort the run; a failing table is reported
    /// and the remaining tables are still exported.
    pub async fn run(&self) -> Result<ExportResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        let catalog = Catalog::load(self.store.as_ref()).await?;
        for name in &self.options.tables {
            if catalog.get(name).is_none() {
                warn!("Requested table {} does not exist, ignoring", name);
            }
        }
        let tables = catalog.select(&self.options.tables);

        let mut sink = Sink::open(&self.options.output, self.options.compress)?;
        info!(
            "Exporting {} tables to {}",
            tables.len(),
            sink.location().display()
        );

        let mut result = ExportResult {
            status: String::new(),
            duration_seconds: 0.0,
            started_at,
            completed_at: started_at,
            output: String::new(),
            tables_total: tables.len(),
            tables_success: 0,
            tables_failed: 0,
            rows_written: 0,
            rows_skipped: 0,
            failed_tables: Vec::new(),
        };

        for table in tables {
            let mut entry = match sink.create_entry(&table.file_name()) {
                Ok(entry) => entry,
                Err(e) => {
                    error!("{}: cannot create output entry: {}", table.name, e);
                    result.tables_failed += 1;
                    result.failed_tables.push(table.name.clone());
                    continue;
                }
            };

            let streamed = stream_table(self.store.as_ref(), table, &mut entry).await;
            let closed = sink.close_entry(entry);

            match (streamed, closed) {
                (Ok(stats), Ok(())) => {
                    info!(
                        "{}: {} rows written, {} skipped",
                        table.name, stats.rows_written, stats.rows_skipped
                    );
                    result.tables_success += 1;
                    result.rows_written += stats.rows_written;
                    result.rows_skipped += stats.rows_skipped;
                }
                (Err(e), _) | (_, Err(e)) => {
                    error!("{}: export failed: {}", table.name, e);
                    result.tables_failed += 1;
                    result.failed_tables.push(table.name.clone());
                }
            }
        }

        let location = sink.finish()?;
        result.output = location.display().to_string();
        result.completed_at = Utc::now();
        result.duration_seconds = start.elapsed().as_secs_f64();
        result.status = if result.tables_failed == 0 {
            "completed".to_string()
        } else {
            "completed_with_errors".to_string()
        };

        info!(
            "Export {}: {}/{} tables, {} rows in {:.2}s",
            result.status,
            result.tables_success,
            result.tables_total,
            result.rows_written,
            result.duration_seconds
        );
        Ok(result)
    }
}
