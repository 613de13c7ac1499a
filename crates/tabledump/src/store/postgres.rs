//! PostgreSQL store.
//!
//! Schema DDL is rendered from `pg_catalog` for every base table of the
//! configured schema, in creation (OID) order. Reads are plain `SELECT`
//! statements streamed row by row. A mutation group is applied inside one
//! transaction as `INSERT ... ON CONFLICT DO UPDATE` statements.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use futures::StreamExt;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Config as PgConfig, Row};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::core::identifier::quote_ident;
use crate::core::record::{Record, RecordDescriptor};
use crate::core::value::{ScalarType, Value};
use crate::error::{DumpError, Result};

use super::tls::{SslMode, TlsBuilder};
use super::{Mutation, RowStream, Store};

const TABLES_QUERY: &str = "SELECT c.oid, c.relname \
    FROM pg_catalog.pg_class c \
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
    WHERE n.nspname = $1 AND c.relkind IN ('r', 'p') AND NOT c.relispartition \
    ORDER BY c.oid";

const COLUMNS_QUERY: &str = "SELECT a.attname, pg_catalog.format_type(a.atttypid, a.atttypmod), a.attnotnull \
    FROM pg_catalog.pg_attribute a \
    WHERE a.attrelid = $1 AND a.attnum > 0 AND NOT a.attisdropped \
    ORDER BY a.attnum";

const PRIMARY_KEY_QUERY: &str = "SELECT a.attname \
    FROM pg_catalog.pg_constraint con \
    CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord) \
    JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum \
    WHERE con.conrelid = $1 AND con.contype = 'p' \
    ORDER BY k.ord";

const INDEXES_QUERY: &str = "SELECT ic.relname, i.indisunique, \
        ARRAY(SELECT a.attname \
              FROM unnest(i.indkey) WITH ORDINALITY AS k(attnum, ord) \
              JOIN pg_catalog.pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = k.attnum \
              ORDER BY k.ord)::text[] \
    FROM pg_catalog.pg_index i \
    JOIN pg_catalog.pg_class ic ON ic.oid = i.indexrelid \
    WHERE i.indrelid = $1 AND NOT i.indisprimary \
      AND i.indexprs IS NULL AND i.indpred IS NULL \
    ORDER BY i.indexrelid";

/// Store backed by a PostgreSQL schema.
pub struct PostgresStore {
    pool: Pool,
    schema: String,
}

impl PostgresStore {
    /// Build the connection pool and verify that the server is reachable.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("tabledump");
        pg_config.options(&session_options(&config.schema));

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let ssl_mode: SslMode = config.ssl_mode.parse()?;
        let pool = match TlsBuilder::new(ssl_mode).connector()? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections)
                    .build()
                    .map_err(|e| DumpError::pool(e, "creating PostgreSQL pool"))?
            }
            Some(tls) => {
                let mgr = Manager::from_config(pg_config, tls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections)
                    .build()
                    .map_err(|e| DumpError::pool(e, "creating PostgreSQL pool"))?
            }
        };

        let store = Self {
            pool,
            schema: config.schema.clone(),
        };
        store.test_connection().await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{} (schema {})",
            config.host, config.port, config.database, config.schema
        );

        Ok(store)
    }

    /// Run `SELECT 1` on a pooled connection.
    pub async fn test_connection(&self) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DumpError::pool(e, "testing PostgreSQL connection"))?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    /// Close the pool; checked-out connections are closed when returned.
    pub fn close(&self) {
        self.pool.close();
    }

    async fn render_ddl(&self) -> Result<Vec<String>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DumpError::pool(e, "loading schema DDL"))?;

        let tables = client.query(TABLES_QUERY, &[&self.schema]).await?;
        let mut statements = Vec::with_capacity(tables.len());

        for table in &tables {
            let oid: u32 = table.get(0);
            let name: String = table.get(1);

            let columns: Vec<(String, String, bool)> = client
                .query(COLUMNS_QUERY, &[&oid])
                .await?
                .iter()
                .map(|row| (row.get(0), row.get(1), row.get(2)))
                .collect();
            let primary_key: Vec<String> = client
                .query(PRIMARY_KEY_QUERY, &[&oid])
                .await?
                .iter()
                .map(|row| row.get(0))
                .collect();

            statements.push(create_table_sql(&name, &columns, &primary_key));

            for index in client.query(INDEXES_QUERY, &[&oid]).await? {
                let index_name: String = index.get(0);
                let unique: bool = index.get(1);
                let index_columns: Vec<String> = index.get(2);
                statements.push(create_index_sql(&index_name, &name, unique, &index_columns));
            }
        }

        debug!(
            "Rendered {} DDL statements for schema {}",
            statements.len(),
            self.schema
        );
        Ok(statements)
    }
}

/// Startup options for every pooled session.
///
/// `TimeZone=UTC` keeps `timestamp without time zone` columns stable when
/// values are bound as `timestamptz`.
fn session_options(schema: &str) -> String {
    format!("-c search_path={} -c TimeZone=UTC", quote_ident(schema))
}

fn create_table_sql(table: &str, columns: &[(String, String, bool)], primary_key: &[String]) -> String {
    let mut parts: Vec<String> = columns
        .iter()
        .map(|(name, data_type, not_null)| {
            if *not_null {
                format!("  {} {} NOT NULL", quote_ident(name), data_type)
            } else {
                format!("  {} {}", quote_ident(name), data_type)
            }
        })
        .collect();

    if !primary_key.is_empty() {
        parts.push(format!("  PRIMARY KEY ({})", quote_list(primary_key)));
    }

    format!("CREATE TABLE {} (\n{}\n)", quote_ident(table), parts.join(",\n"))
}

fn create_index_sql(index: &str, table: &str, unique: bool, columns: &[String]) -> String {
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        if unique { "UNIQUE " } else { "" },
        quote_ident(index),
        quote_ident(table),
        quote_list(columns)
    )
}

fn quote_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the upsert statement for one mutation.
///
/// Parameters carry explicit casts so typed NULLs bind without inference.
fn upsert_sql(mutation: &Mutation) -> String {
    let columns = quote_list(&mutation.columns);
    let placeholders = mutation
        .values
        .iter()
        .enumerate()
        .map(|(i, v)| format!("${}::{}", i + 1, v.scalar_type().pg_cast()))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&mutation.table),
        columns,
        placeholders
    );

    if mutation.primary_key.is_empty() {
        return sql;
    }

    let updates: Vec<String> = mutation
        .columns
        .iter()
        .filter(|c| !mutation.primary_key.contains(c))
        .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
        .collect();

    if updates.is_empty() {
        sql.push_str(&format!(
            " ON CONFLICT ({}) DO NOTHING",
            quote_list(&mutation.primary_key)
        ));
    } else {
        sql.push_str(&format!(
            " ON CONFLICT ({}) DO UPDATE SET {}",
            quote_list(&mutation.primary_key),
            updates.join(", ")
        ));
    }
    sql
}

/// Owned parameter for one value, typed for NULLs.
fn to_param(value: &Value) -> Box<dyn ToSql + Sync + Send> {
    match value {
        Value::Null(ScalarType::Bool) => Box::new(None::<bool>),
        Value::Null(ScalarType::Int64) => Box::new(None::<i64>),
        Value::Null(ScalarType::Float64) => Box::new(None::<f64>),
        Value::Null(ScalarType::String) => Box::new(None::<String>),
        Value::Null(ScalarType::Bytes) => Box::new(None::<Vec<u8>>),
        Value::Null(ScalarType::Date) => Box::new(None::<NaiveDate>),
        Value::Null(ScalarType::Timestamp) => Box::new(None::<DateTime<Utc>>),
        Value::Bool(v) => Box::new(*v),
        Value::Int64(v) => Box::new(*v),
        Value::Float64(v) => Box::new(*v),
        Value::String(v) => Box::new(v.clone()),
        Value::Bytes(v) => Box::new(v.clone()),
        Value::Date(v) => Box::new(*v),
        Value::Timestamp(v) => Box::new(*v),
    }
}

/// Read one column as the field's scalar type.
fn read_value(
    row: &Row,
    idx: usize,
    scalar: ScalarType,
) -> std::result::Result<Value, tokio_postgres::Error> {
    let ty = row.columns()[idx].type_();

    let value = match scalar {
        ScalarType::Bool => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        ScalarType::Int64 => {
            if *ty == Type::INT2 {
                row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Int64(v.into()))
            } else if *ty == Type::INT4 {
                row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Int64(v.into()))
            } else {
                row.try_get::<_, Option<i64>>(idx)?.map(Value::Int64)
            }
        }
        ScalarType::Float64 => {
            if *ty == Type::FLOAT4 {
                row.try_get::<_, Option<f32>>(idx)?.map(|v| Value::Float64(v.into()))
            } else {
                row.try_get::<_, Option<f64>>(idx)?.map(Value::Float64)
            }
        }
        ScalarType::String => row.try_get::<_, Option<String>>(idx)?.map(Value::String),
        ScalarType::Bytes => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Bytes),
        ScalarType::Date => row.try_get::<_, Option<NaiveDate>>(idx)?.map(Value::Date),
        ScalarType::Timestamp => {
            if *ty == Type::TIMESTAMP {
                row.try_get::<_, Option<NaiveDateTime>>(idx)?
                    .map(|v| Value::Timestamp(v.and_utc()))
            } else {
                row.try_get::<_, Option<DateTime<Utc>>>(idx)?
                    .map(Value::Timestamp)
            }
        }
    };

    Ok(value.unwrap_or(Value::Null(scalar)))
}

fn convert_row(row: &Row, descriptor: &RecordDescriptor) -> Result<Record> {
    if row.len() != descriptor.len() {
        return Err(DumpError::row_conversion(
            "*",
            format!(
                "row has {} columns, record has {} fields",
                row.len(),
                descriptor.len()
            ),
        ));
    }

    let mut values = Vec::with_capacity(descriptor.len());
    for (idx, field) in descriptor.fields().iter().enumerate() {
        let value = read_value(row, idx, field.repr.scalar)
            .map_err(|e| DumpError::row_conversion(&field.name, e))?;
        values.push(value);
    }
    Ok(Record::from_values(values))
}

#[async_trait]
impl Store for PostgresStore {
    async fn database_ddl(&self) -> Result<Vec<String>> {
        self.render_ddl()
            .await
            .map_err(|e| DumpError::SchemaUnavailable(e.to_string()))
    }

    async fn query(&self, sql: &str, descriptor: &RecordDescriptor) -> Result<RowStream> {
        debug!("query: {}", sql);
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DumpError::pool(e, "starting table scan"))?;

        let params: [&(dyn ToSql + Sync); 0] = [];
        let rows = client
            .query_raw(sql, params)
            .await
            .map_err(|e| DumpError::query(sql, e))?;

        let descriptor = descriptor.clone();
        let statement = sql.to_string();
        let stream = rows.map(move |row| {
            // The pooled connection stays checked out until the scan is dropped.
            let _conn = &client;
            match row {
                Ok(row) => convert_row(&row, &descriptor),
                Err(e) => Err(DumpError::query(&statement, e)),
            }
        });

        Ok(stream.boxed())
    }

    async fn apply(&self, mutations: &[Mutation]) -> Result<()> {
        if mutations.is_empty() {
            return Ok(());
        }

        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| DumpError::pool(e, "applying mutations"))?;
        let tx = client.transaction().await?;

        for mutation in mutations {
            let sql = upsert_sql(mutation);
            let statement = tx.prepare_cached(&sql).await?;
            let params: Vec<Box<dyn ToSql + Sync + Send>> =
                mutation.values.iter().map(to_param).collect();
            let refs: Vec<&(dyn ToSql + Sync)> = params
                .iter()
                .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                .collect();
            tx.execute(&statement, &refs).await?;
        }

        tx.commit().await?;
        debug!("Applied {} mutations in one transaction", mutations.len());
        Ok(())
    }

    fn store_type(&self) -> &str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::parse_statement;

    fn mutation(pk: &[&str]) -> Mutation {
        Mutation {
            table: "Users".into(),
            columns: vec!["id".into(), "name".into()],
            primary_key: pk.iter().map(|s| s.to_string()).collect(),
            values: vec![Value::Int64(1), Value::Null(ScalarType::String)],
        }
    }

    #[test]
    fn test_session_pins_utc() {
        assert_eq!(
            session_options("sales"),
            "-c search_path=\"sales\" -c TimeZone=UTC"
        );
    }

    #[test]
    fn test_upsert_sql_with_primary_key() {
        assert_eq!(
            upsert_sql(&mutation(&["id"])),
            "INSERT INTO \"Users\" (\"id\", \"name\") VALUES ($1::int8, $2::text) \
             ON CONFLICT (\"id\") DO UPDATE SET \"name\" = EXCLUDED.\"name\""
        );
    }

    #[test]
    fn test_upsert_sql_without_primary_key() {
        assert_eq!(
            upsert_sql(&mutation(&[])),
            "INSERT INTO \"Users\" (\"id\", \"name\") VALUES ($1::int8, $2::text)"
        );
    }

    #[test]
    fn test_upsert_sql_key_only_table() {
        let m = Mutation {
            table: "tags".into(),
            columns: vec!["tag".into()],
            primary_key: vec!["tag".into()],
            values: vec![Value::from("x")],
        };
        assert!(upsert_sql(&m).ends_with("ON CONFLICT (\"tag\") DO NOTHING"));
    }

    #[test]
    fn test_rendered_ddl_parses() {
        let columns = vec![
            ("id".to_string(), "bigint".to_string(), true),
            ("name".to_string(), "character varying(64)".to_string(), false),
            ("seen".to_string(), "timestamp with time zone".to_string(), false),
        ];
        let sql = create_table_sql("Users", &columns, &["id".to_string()]);
        let stmt = parse_statement(&format!("{};", sql)).unwrap().unwrap();
        assert_eq!(stmt.table_name, "Users");
        assert_eq!(stmt.primary_key, vec!["id".to_string()]);
        assert_eq!(stmt.columns.len(), 3);

        let index = create_index_sql("users_name_idx", "Users", false, &["name".to_string()]);
        assert_eq!(
            index,
            "CREATE INDEX \"users_name_idx\" ON \"Users\" (\"name\")"
        );
        assert!(parse_statement(&format!("{};", index)).unwrap().is_none());
    }
}
