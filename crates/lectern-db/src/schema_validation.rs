//! Schema name validation for session scoping.
//!
//! Schema names are interpolated into `SET LOCAL search_path`, which cannot be
//! parameterized, so they are restricted to plain identifiers.

use lectern_core::{Error, Result};

/// PostgreSQL identifier length limit.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Schemas that must never be targeted by a scoped session.
const RESERVED_SCHEMAS: &[&str] = &[
    "pg_catalog",
    "information_schema",
    "pg_toast",
    "select",
    "insert",
    "update",
    "delete",
    "drop",
    "create",
    "alter",
    "grant",
    "revoke",
    "truncate",
];

/// Validate a PostgreSQL schema name.
///
/// A valid name is 1 to 63 ASCII characters, starts with a letter or
/// underscore, contains only alphanumerics and underscores, and is not a
/// system schema or SQL keyword. `public` is allowed.
///
/// ```
/// use lectern_db::validate_schema_name;
///
/// assert!(validate_schema_name("lectern_test_1").is_ok());
/// assert!(validate_schema_name("1st").is_err());
/// assert!(validate_schema_name("").is_err());
/// ```
pub fn validate_schema_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "Schema name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidInput(format!(
            "Schema name exceeds {} character limit: {} characters",
            MAX_IDENTIFIER_LEN,
            name.len()
        )));
    }

    let starts_ok = name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !starts_ok {
        return Err(Error::InvalidInput(format!(
            "Schema name must start with a letter or underscore: '{}'",
            name
        )));
    }

    if let Some(ch) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(Error::InvalidInput(format!(
            "Schema name contains invalid character: '{}'",
            ch
        )));
    }

    let lowercase = name.to_lowercase();
    if RESERVED_SCHEMAS.contains(&lowercase.as_str()) {
        return Err(Error::InvalidInput(format!(
            "Schema name '{}' is reserved",
            name
        )));
    }

    Ok(())
}
