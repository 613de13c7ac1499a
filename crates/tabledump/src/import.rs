//! Import driver: JSON lines files upserted into their matching tables.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::buffer::MutationBuffer;
use crate::catalog::Catalog;
use crate::codec;
use crate::core::record::TableDefinition;
use crate::error::Result;
use crate::store::{Mutation, Store};

/// Summary of an import run.
#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub status: String,
    pub duration_seconds: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub files_total: usize,
    pub files_imported: usize,

    /// Files with no matching table or that could not be opened.
    pub files_skipped: usize,

    /// Files stopped by a failed flush.
    pub files_failed: usize,

    pub rows_applied: usize,
    pub lines_skipped: usize,

    /// Mutations still pending when the run ended.
    pub rows_dropped: usize,

    pub flushes: usize,
    pub failed_files: Vec<String>,
}

impl ImportResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether every readable line of every matched file reached the store.
    pub fn is_complete(&self) -> bool {
        self.files_failed == 0 && self.rows_dropped == 0
    }
}

enum FileOutcome {
    Imported,
    Failed,
}

/// Table name for an input file: its base name without extension.
pub fn table_name_for(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.to_string())
}

/// Runs an import against one store.
pub struct Importer {
    store: Arc<dyn Store>,
    buffer_capacity: usize,
}

impl Importer {
    pub fn new(store: Arc<dyn Store>, buffer_capacity: usize) -> Self {
        Self {
            store,
            buffer_capacity,
        }
    }

    /// Import every file in order.
    ///
    /// Files without a matching table, unreadable files and undecodable lines
    /// are reported and skipped. A failed flush stops the current file.
    pub async fn run(&self, files: &[PathBuf]) -> Result<ImportResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        let catalog = Catalog::load(self.store.as_ref()).await?;
        let mut buffer = MutationBuffer::new(self.store.clone(), self.buffer_capacity);

        let mut result = ImportResult {
            status: String::new(),
            duration_seconds: 0.0,
            started_at,
            completed_at: started_at,
            files_total: files.len(),
            files_imported: 0,
            files_skipped: 0,
            files_failed: 0,
            rows_applied: 0,
            lines_skipped: 0,
            rows_dropped: 0,
            flushes: 0,
            failed_files: Vec::new(),
        };

        for path in files {
            let Some(table) = table_name_for(path).and_then(|name| catalog.get(&name)) else {
                warn!("{}: no matching table, skipping file", path.display());
                result.files_skipped += 1;
                continue;
            };

            let file = match File::open(path).await {
                Ok(file) => file,
                Err(e) => {
                    warn!("{}: cannot open file: {}", path.display(), e);
                    result.files_skipped += 1;
                    continue;
                }
            };

            info!("Importing {} into {}", path.display(), table.name);
            match import_file(file, path, table, &mut buffer, &mut result).await {
                FileOutcome::Imported => result.files_imported += 1,
                FileOutcome::Failed => {
                    result.files_failed += 1;
                    result.failed_files.push(path.display().to_string());
                }
            }
        }

        let applied = buffer.applied();
        let pending = buffer.pending().len();
        let flushes = buffer.flushes();
        match buffer.close().await {
            Ok(()) => {
                result.rows_applied = applied + pending;
                result.flushes = flushes + usize::from(pending > 0);
            }
            Err(e) => {
                error!("Final flush failed, {} writes dropped: {}", pending, e);
                result.rows_applied = applied;
                result.rows_dropped = pending;
                result.flushes = flushes;
            }
        }

        result.completed_at = Utc::now();
        result.duration_seconds = start.elapsed().as_secs_f64();
        result.status = if result.rows_dropped > 0 {
            "failed".to_string()
        } else if result.is_complete() && result.files_skipped == 0 && result.lines_skipped == 0 {
            "completed".to_string()
        } else {
            "completed_with_errors".to_string()
        };

        info!(
            "Import {}: {} files, {} rows applied in {:.2}s",
            result.status, result.files_imported, result.rows_applied, result.duration_seconds
        );
        Ok(result)
    }
}

async fn import_file(
    file: File,
    path: &Path,
    table: &TableDefinition,
    buffer: &mut MutationBuffer,
    result: &mut ImportResult,
) -> FileOutcome {
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("{}: read failed after line {}: {}", path.display(), line_no, e);
                return FileOutcome::Failed;
            }
        }
        line_no += 1;

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim_end_matches(['\n', '\r']),
            Err(e) => {
                warn!("{}:{}: skipping line: invalid UTF-8: {}", path.display(), line_no, e);
                result.lines_skipped += 1;
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let record = match codec::decode(line, &table.descriptor) {
            Ok(record) => record,
            Err(e) => {
                warn!("{}:{}: skipping line: {}", path.display(), line_no, e);
                result.lines_skipped += 1;
                continue;
            }
        };

        let mutation = Mutation::insert_or_update(table, &record);
        if let Err(e) = buffer.append(vec![mutation], false).await {
            error!("{}:{}: stopping file: {}", path.display(), line_no, e);
            return FileOutcome::Failed;
        }
    }

    if let Err(e) = buffer.flush().await {
        error!("{}: final flush failed: {}", path.display(), e);
        return FileOutcome::Failed;
    }

    debug!("{}: {} lines read", path.display(), line_no);
    FileOutcome::Imported
}
