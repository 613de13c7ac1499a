//! In-memory store.
//!
//! Holds DDL text, table rows and every applied mutation group. Failures can be
//! injected for DDL reads, table scans, single rows and apply calls.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::core::identifier::unquote_ident;
use crate::core::record::{Record, RecordDescriptor};
use crate::error::{DumpError, Result};

use super::{Mutation, RowStream, Store};

#[derive(Debug, Clone)]
enum StoredRow {
    Record(Record),
    Unreadable { column: String, message: String },
}

#[derive(Debug, Default)]
struct MemoryState {
    ddl: Vec<String>,
    ddl_failure: Option<String>,
    tables: HashMap<String, Vec<StoredRow>>,
    failing_scans: HashMap<String, String>,
    apply_failures: usize,
    applied: Vec<Vec<Mutation>>,
}

/// Store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose schema is the given DDL statements.
    pub fn with_ddl<I, S>(ddl: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        store.lock().ddl = ddl.into_iter().map(Into::into).collect();
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `database_ddl` fail with the given message.
    pub fn fail_ddl(&self, message: impl Into<String>) {
        self.lock().ddl_failure = Some(message.into());
    }

    /// Append rows to a table, creating the table if needed.
    pub fn insert_rows(&self, table: &str, rows: impl IntoIterator<Item = Record>) {
        let mut state = self.lock();
        let stored = state.tables.entry(table.to_string()).or_default();
        stored.extend(rows.into_iter().map(StoredRow::Record));
    }

    /// Append a row that fails conversion when scanned.
    pub fn insert_unreadable_row(&self, table: &str, column: &str, message: &str) {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(StoredRow::Unreadable {
                column: column.to_string(),
                message: message.to_string(),
            });
    }

    /// Make every scan of `table` fail with the given message.
    pub fn fail_scans_of(&self, table: &str, message: impl Into<String>) {
        self.lock()
            .failing_scans
            .insert(table.to_string(), message.into());
    }

    /// Make the next `count` apply calls fail without changing any data.
    pub fn fail_next_applies(&self, count: usize) {
        self.lock().apply_failures = count;
    }

    /// Current rows of a table, in insertion order. Unreadable rows are omitted.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock()
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| match row {
                        StoredRow::Record(record) => Some(record.clone()),
                        StoredRow::Unreadable { .. } => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every successfully applied mutation group, in apply order.
    pub fn applied_groups(&self) -> Vec<Vec<Mutation>> {
        self.lock().applied.clone()
    }
}

/// Extract the table name from `SELECT * FROM <table>`.
fn scanned_table(sql: &str) -> Option<String> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    let prefix = "SELECT * FROM ";
    if trimmed.len() <= prefix.len() || !trimmed[..prefix.len()].eq_ignore_ascii_case(prefix) {
        return None;
    }
    Some(unquote_ident(&trimmed[prefix.len()..]))
}

fn check_row(record: &Record, descriptor: &RecordDescriptor) -> Result<()> {
    if record.values().len() != descriptor.len() {
        return Err(DumpError::row_conversion(
            "*",
            format!(
                "row has {} values, table has {} columns",
                record.values().len(),
                descriptor.len()
            ),
        ));
    }

    for (value, field) in record.values().iter().zip(descriptor.fields()) {
        if value.scalar_type() != field.repr.scalar {
            return Err(DumpError::row_conversion(
                &field.name,
                format!("expected {}, found {}", field.repr.scalar, value.scalar_type()),
            ));
        }
        if value.is_null() && !field.repr.optional {
            return Err(DumpError::row_conversion(&field.name, "unexpected NULL"));
        }
    }

    Ok(())
}

fn key_of(mutation: &Mutation) -> Vec<usize> {
    mutation
        .primary_key
        .iter()
        .filter_map(|pk| mutation.columns.iter().position(|c| c == pk))
        .collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn database_ddl(&self) -> Result<Vec<String>> {
        let state = self.lock();
        if let Some(message) = &state.ddl_failure {
            return Err(DumpError::SchemaUnavailable(message.clone()));
        }
        Ok(state.ddl.clone())
    }

    async fn query(&self, sql: &str, descriptor: &RecordDescriptor) -> Result<RowStream> {
        debug!("memory query: {}", sql);
        let table = scanned_table(sql)
            .ok_or_else(|| DumpError::query("?", format!("unsupported query: {}", sql)))?;

        let state = self.lock();
        if let Some(message) = state.failing_scans.get(&table) {
            return Err(DumpError::query(&table, message));
        }
        let rows = state
            .tables
            .get(&table)
            .cloned()
            .ok_or_else(|| DumpError::query(&table, "relation does not exist"))?;
        drop(state);

        let descriptor = descriptor.clone();
        let items: Vec<Result<Record>> = rows
            .into_iter()
            .map(|row| match row {
                StoredRow::Record(record) => check_row(&record, &descriptor).map(|_| record),
                StoredRow::Unreadable { column, message } => {
                    Err(DumpError::row_conversion(column, message))
                }
            })
            .collect();

        Ok(stream::iter(items).boxed())
    }

    async fn apply(&self, mutations: &[Mutation]) -> Result<()> {
        let mut state = self.lock();
        if state.apply_failures > 0 {
            state.apply_failures -= 1;
            return Err(DumpError::Transaction(format!(
                "memory store rejected a group of {} mutations",
                mutations.len()
            )));
        }

        for mutation in mutations {
            let key = key_of(mutation);
            let rows = state.tables.entry(mutation.table.clone()).or_default();
            let record = Record::from_values(mutation.values.clone());

            let existing = if key.is_empty() {
                None
            } else {
                rows.iter().position(|row| match row {
                    StoredRow::Record(r) => key.iter().all(|&i| r.get(i) == record.get(i)),
                    StoredRow::Unreadable { .. } => false,
                })
            };

            match existing {
                Some(pos) => rows[pos] = StoredRow::Record(record),
                None => rows.push(StoredRow::Record(record)),
            }
        }

        state.applied.push(mutations.to_vec());
        Ok(())
    }

    fn store_type(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{FieldDescriptor, FieldRepr};
    use crate::core::value::{ScalarType, Value};
    use futures::TryStreamExt;

    fn users() -> RecordDescriptor {
        RecordDescriptor::new(vec![
            FieldDescriptor {
                name: "id".into(),
                repr: FieldRepr::required(ScalarType::Int64),
            },
            FieldDescriptor {
                name: "name".into(),
                repr: FieldRepr::optional(ScalarType::String),
            },
        ])
    }

    fn upsert(id: i64, name: &str) -> Mutation {
        Mutation {
            table: "Users".into(),
            columns: vec!["id".into(), "name".into()],
            primary_key: vec!["id".into()],
            values: vec![Value::Int64(id), Value::from(name)],
        }
    }

    #[test]
    fn test_scanned_table() {
        assert_eq!(scanned_table("SELECT * FROM \"Users\""), Some("Users".into()));
        assert_eq!(scanned_table("select * from orders;"), Some("orders".into()));
        assert_eq!(scanned_table("SELECT id FROM t"), None);
    }

    #[tokio::test]
    async fn test_query_streams_rows_in_order() {
        let store = MemoryStore::new();
        store.insert_rows(
            "Users",
            vec![
                Record::from_values(vec![Value::Int64(1), Value::from("a")]),
                Record::from_values(vec![Value::Int64(2), Value::Null(ScalarType::String)]),
            ],
        );

        let rows: Vec<Record> = store
            .query("SELECT * FROM \"Users\"", &users())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(0), Some(&Value::Int64(1)));
    }

    #[tokio::test]
    async fn test_query_reports_mismatched_row() {
        let store = MemoryStore::new();
        store.insert_rows(
            "Users",
            vec![Record::from_values(vec![Value::from("oops"), Value::from("a")])],
        );
        let mut stream = store.query("SELECT * FROM \"Users\"", &users()).await.unwrap();
        let first = stream.next().await.unwrap();
        assert!(first.unwrap_err().is_row_level());
    }

    #[tokio::test]
    async fn test_query_unknown_table() {
        let store = MemoryStore::new();
        let err = store.query("SELECT * FROM \"Nope\"", &users()).await.err().unwrap();
        assert!(matches!(err, DumpError::Query { .. }));
    }

    #[tokio::test]
    async fn test_apply_upserts_by_key() {
        let store = MemoryStore::new();
        store.apply(&[upsert(1, "a"), upsert(2, "b")]).await.unwrap();
        store.apply(&[upsert(1, "z")]).await.unwrap();

        let rows = store.rows("Users");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(1), Some(&Value::from("z")));
        assert_eq!(store.applied_groups().len(), 2);
    }

    #[tokio::test]
    async fn test_injected_apply_failure_changes_nothing() {
        let store = MemoryStore::new();
        store.fail_next_applies(1);
        assert!(store.apply(&[upsert(1, "a")]).await.is_err());
        assert!(store.rows("Users").is_empty());
        assert!(store.applied_groups().is_empty());

        store.apply(&[upsert(1, "a")]).await.unwrap();
        assert_eq!(store.rows("Users").len(), 1);
    }

    #[tokio::test]
    async fn test_ddl_failure() {
        let store = MemoryStore::with_ddl(["CREATE TABLE a (id BIGINT)"]);
        assert_eq!(store.database_ddl().await.unwrap().len(), 1);
        store.fail_ddl("unreachable");
        assert!(matches!(
            store.database_ddl().await,
            Err(DumpError::SchemaUnavailable(_))
        ));
    }
}
