//! Configuration types.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::buffer::DEFAULT_CAPACITY;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Store connection.
    pub store: StoreConfig,

    /// Export defaults.
    #[serde(default)]
    pub export: ExportConfig,

    /// Import defaults.
    #[serde(default)]
    pub import: ImportConfig,
}

/// PostgreSQL store connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema whose tables are exported and imported (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,

    /// Connection pool size (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Export defaults, overridable from the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Output directory, or archive path when compressing (default: "out").
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Write a single `.tar.gz` archive (default: false).
    #[serde(default)]
    pub compress: bool,

    /// Tables to export by exact name; empty exports all.
    #[serde(default)]
    pub tables: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            compress: false,
            tables: Vec::new(),
        }
    }
}

/// Import defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Mutations per applied group (default: 1000).
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

fn default_max_connections() -> usize {
    4
}

fn default_output() -> PathBuf {
    PathBuf::from("out")
}

fn default_buffer_capacity() -> usize {
    DEFAULT_CAPACITY
}
