//! Schema catalog: table definitions built from the store's DDL.

use tracing::{debug, info};

use crate::core::record::TableDefinition;
use crate::ddl;
use crate::error::Result;
use crate::store::Store;

/// Ordered table definitions of one store, in DDL order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: Vec<TableDefinition>,
}

impl Catalog {
    /// Load every table definition from the store.
    ///
    /// Any fetch, parse or record-model failure aborts the whole load.
    pub async fn load(store: &dyn Store) -> Result<Self> {
        let ddl = store.database_ddl().await?;
        let tables = Self::from_ddl(&ddl)?;
        info!("Loaded {} table definitions", tables.len());
        Ok(tables)
    }

    /// Build the catalog from DDL text entries.
    pub fn from_ddl<S: AsRef<str>>(ddl: &[S]) -> Result<Self> {
        let mut tables = Vec::new();

        for entry in ddl {
            for statement in ddl::split_statements(entry.as_ref()) {
                match ddl::parse_statement(&statement)? {
                    Some(create) => tables.push(TableDefinition::from_statement(&create)?),
                    None => debug!("Skipping non-table statement: {}", statement),
                }
            }
        }

        Ok(Self { tables })
    }

    pub fn tables(&self) -> &[TableDefinition] {
        &self.tables
    }

    /// Look up a table by exact name.
    pub fn get(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Tables whose names are in `names`, in catalog order. An empty filter selects all.
    pub fn select(&self, names: &[String]) -> Vec<&TableDefinition> {
        self.tables
            .iter()
            .filter(|t| names.is_empty() || names.iter().any(|n| n == &t.name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
