//! Row streamer: full-table scan to JSON lines.

use std::io::Write;

use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, warn};

use crate::codec;
use crate::core::identifier::quote_ident;
use crate::core::record::TableDefinition;
use crate::error::{DumpError, Result};
use crate::store::Store;

/// Per-table counters of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub rows_written: u64,
    pub rows_skipped: u64,
}

/// The full-table scan statement for a table.
pub fn select_all_sql(table: &str) -> String {
    format!("SELECT * FROM {}", quote_ident(table))
}

/// Scan `table` and write one JSON line per row to `out`.
///
/// Rows that fail conversion, encoding or writing are reported and skipped.
/// A failure of the scan itself ends the table with [`DumpError::Query`].
pub async fn stream_table<W: Write + ?Sized>(
    store: &dyn Store,
    table: &TableDefinition,
    out: &mut W,
) -> Result<StreamStats> {
    let sql = select_all_sql(&table.name);
    debug!("Scanning {}: {}", table.name, sql);

    let mut rows = store
        .query(&sql, &table.descriptor)
        .await
        .map_err(|e| as_query_error(&table.name, e))?;

    let mut stats = StreamStats::default();
    while let Some(item) = rows.next().await {
        let record = match item {
            Ok(record) => record,
            Err(e) if e.is_row_level() => {
                warn!("{}: skipping row: {}", table.name, e);
                stats.rows_skipped += 1;
                continue;
            }
            Err(e) => return Err(as_query_error(&table.name, e)),
        };

        let line = match codec::encode(&record, &table.descriptor) {
            Ok(line) => line,
            Err(e) => {
                warn!("{}: skipping row that failed to encode: {}", table.name, e);
                stats.rows_skipped += 1;
                continue;
            }
        };

        if let Err(e) = writeln!(out, "{}", line) {
            warn!("{}: failed to write row: {}", table.name, e);
            stats.rows_skipped += 1;
            continue;
        }
        stats.rows_written += 1;
    }

    Ok(stats)
}

fn as_query_error(table: &str, err: DumpError) -> DumpError {
    match err {
        DumpError::Query { message, .. } => DumpError::query(table, message),
        other => DumpError::query(table, other),
    }
}
