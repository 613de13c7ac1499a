//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{DumpError, Result};
use crate::store::SslMode;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let store = &config.store;
    if store.host.is_empty() {
        return Err(DumpError::Config("store.host is required".into()));
    }
    if store.database.is_empty() {
        return Err(DumpError::Config("store.database is required".into()));
    }
    if store.user.is_empty() {
        return Err(DumpError::Config("store.user is required".into()));
    }
    if let Err(DumpError::Config(message)) = validate_identifier(&store.schema) {
        return Err(DumpError::Config(format!("store.schema: {}", message)));
    }
    store.ssl_mode.parse::<SslMode>()?;
    if store.max_connections == 0 {
        return Err(DumpError::Config(
            "store.max_connections must be at least 1".into(),
        ));
    }

    if config.import.buffer_capacity == 0 {
        return Err(DumpError::Config(
            "import.buffer_capacity must be at least 1".into(),
        ));
    }

    Ok(())
}
