//! Identifier quoting for generated SQL.
//!
//! Table and column names cannot be bound as parameters, so statements built
//! at runtime quote them instead.

use crate::error::{DumpError, Result};

/// Maximum identifier length accepted (PostgreSQL allows 63 bytes, Spanner 128).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier before it is spliced into SQL.
///
/// Rejects empty names, names containing NUL bytes and overly long names.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DumpError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(DumpError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(DumpError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote an identifier with double quotes, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Remove one level of double-quote or backtick quoting, if present.
pub fn unquote_ident(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        return trimmed[1..trimmed.len() - 1].replace("\"\"", "\"");
    }
    if trimmed.len() >= 2 && trimmed.starts_with('`') && trimmed.ends_with('`') {
        return trimmed[1..trimmed.len() - 1].to_string();
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("Users").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("bad\0name").is_err());
        assert!(validate_identifier(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("user\"name"), "\"user\"\"name\"");
    }

    #[test]
    fn test_unquote_ident() {
        assert_eq!(unquote_ident("\"Users\""), "Users");
        assert_eq!(unquote_ident("\"a\"\"b\""), "a\"b");
        assert_eq!(unquote_ident("`Users`"), "Users");
        assert_eq!(unquote_ident(" plain "), "plain");
    }
}
