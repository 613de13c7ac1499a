//! Error types for the export/import library.

use thiserror::Error;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for schema load and record model errors.
pub const EXIT_SCHEMA_ERROR: u8 = 2;
/// Exit code for store connection and query errors.
pub const EXIT_STORE_ERROR: u8 = 3;
/// Exit code for mutation apply errors.
pub const EXIT_APPLY_ERROR: u8 = 4;
/// Exit code for local I/O errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for export and import operations.
#[derive(Error, Debug)]
pub enum DumpError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store connection or statement error
    #[error("Store error: {0}")]
    Store(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// The schema could not be fetched from the store
    #[error("Schema unavailable: {0}")]
    SchemaUnavailable(String),

    /// A DDL statement could not be parsed
    #[error("Schema parse error in statement {statement:?}: {message}")]
    SchemaParse { statement: String, message: String },

    /// A column type outside the supported scalar set
    #[error("Unsupported column type for {column}: {tag}")]
    UnsupportedColumnType { column: String, tag: String },

    /// A column uses a schema feature that records cannot represent (arrays)
    #[error("Unsupported schema feature for {column}: {feature}")]
    UnsupportedSchemaFeature { column: String, feature: String },

    /// A JSON line could not be decoded into a record
    #[error("Record decode error: {0}")]
    RecordDecode(String),

    /// A store row could not be converted into a record
    #[error("Row conversion failed for column {column}: {message}")]
    RowConversion { column: String, message: String },

    /// A write transaction was rejected or rolled back
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// A full-table scan failed
    #[error("Query failed for table {table}: {message}")]
    Query { table: String, message: String },

    /// Applying a mutation group failed; the group is still pending
    #[error("Mutation apply failed ({pending} pending, {unplaced} not buffered): {message}")]
    MutationApply {
        pending: usize,
        unplaced: usize,
        message: String,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DumpError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        DumpError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Query error
    pub fn query(table: impl Into<String>, message: impl ToString) -> Self {
        DumpError::Query {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a RowConversion error
    pub fn row_conversion(column: impl Into<String>, message: impl ToString) -> Self {
        DumpError::RowConversion {
            column: column.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error only affects a single row of a scan.
    pub fn is_row_level(&self) -> bool {
        matches!(self, DumpError::RowConversion { .. })
    }

    /// Map the error class to a process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            DumpError::Config(_) | DumpError::Yaml(_) => EXIT_CONFIG_ERROR,
            DumpError::SchemaUnavailable(_)
            | DumpError::SchemaParse { .. }
            | DumpError::UnsupportedColumnType { .. }
            | DumpError::UnsupportedSchemaFeature { .. }
            | DumpError::RecordDecode(_)
            | DumpError::Json(_) => EXIT_SCHEMA_ERROR,
            DumpError::Store(_)
            | DumpError::Pool { .. }
            | DumpError::RowConversion { .. }
            | DumpError::Transaction(_)
            | DumpError::Query { .. } => EXIT_STORE_ERROR,
            DumpError::MutationApply { .. } => EXIT_APPLY_ERROR,
            DumpError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for export and import operations.
pub type Result<T> = std::result::Result<T, DumpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(DumpError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            DumpError::SchemaUnavailable("down".into()).exit_code(),
            EXIT_SCHEMA_ERROR
        );
        assert_eq!(DumpError::query("Users", "boom").exit_code(), EXIT_STORE_ERROR);
        assert_eq!(
            DumpError::MutationApply {
                pending: 3,
                unplaced: 0,
                message: "aborted".into()
            }
            .exit_code(),
            EXIT_APPLY_ERROR
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(DumpError::from(io).exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_row_level_classification() {
        assert!(DumpError::row_conversion("id", "bad int").is_row_level());
        assert!(!DumpError::query("Users", "connection reset").is_row_level());
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = DumpError::from(io);
        let text = err.format_detailed();
        assert!(text.starts_with("Error: IO error: denied"));
    }
}
