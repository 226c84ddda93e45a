//! Short external identifiers for library elements.
//!
//! Element uids are what dashboards store to reference an element, so they
//! must stay stable and be safe to embed in URLs. Generated uids are
//! [`UID_LENGTH`] random alphanumeric characters (62^14 ≈ 1.2e25 values).
//! Collisions are still caught by the `(org_id, uid)` unique constraint.

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::defaults::{UID_LENGTH, UID_MAX_LENGTH};
use crate::error::{Error, Result};

/// Produces external identifiers for new elements.
pub trait UidGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Default generator: random alphanumeric strings.
#[derive(Debug, Clone, Copy)]
pub struct ShortUidGenerator {
    length: usize,
}

impl ShortUidGenerator {
    pub fn new() -> Self {
        Self { length: UID_LENGTH }
    }

    /// Use a custom length, clamped to `1..=UID_MAX_LENGTH`.
    pub fn with_length(length: usize) -> Self {
        Self {
            length: length.clamp(1, UID_MAX_LENGTH),
        }
    }
}

impl Default for ShortUidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UidGenerator for ShortUidGenerator {
    fn generate(&self) -> String {
        generate_short_uid(self.length)
    }
}

/// Generate a random alphanumeric uid of `length` characters.
#[inline]
pub fn generate_short_uid(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Validate a caller-supplied uid.
///
/// Accepts 1 to [`UID_MAX_LENGTH`] characters from `[A-Za-z0-9_-]`.
pub fn validate_uid(uid: &str) -> Result<()> {
    if uid.is_empty() {
        return Err(Error::InvalidInput("uid cannot be empty".to_string()));
    }
    if uid.len() > UID_MAX_LENGTH {
        return Err(Error::InvalidInput(format!(
            "uid exceeds {} character limit: {} characters",
            UID_MAX_LENGTH,
            uid.len()
        )));
    }
    if let Some(ch) = uid
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != '-')
    {
        return Err(Error::InvalidInput(format!(
            "uid contains invalid character: '{}'",
            ch
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_uid_shape() {
        let uid = ShortUidGenerator::new().generate();
        assert_eq!(uid.len(), UID_LENGTH);
        assert!(uid.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(validate_uid(&uid).is_ok());
    }

    #[test]
    fn test_generated_uids_do_not_repeat() {
        let gen = ShortUidGenerator::new();
        let uids: HashSet<String> = (0..1000).map(|_| gen.generate()).collect();
        assert_eq!(uids.len(), 1000);
    }

    #[test]
    fn test_with_length_is_clamped() {
        assert_eq!(ShortUidGenerator::with_length(0).generate().len(), 1);
        assert_eq!(
            ShortUidGenerator::with_length(500).generate().len(),
            UID_MAX_LENGTH
        );
    }

    #[test]
    fn test_validate_uid() {
        assert!(validate_uid("cpu-usage_01").is_ok());
        assert!(validate_uid("").is_err());
        assert!(validate_uid("has space").is_err());
        assert!(validate_uid("semi;colon").is_err());
        assert!(validate_uid(&"a".repeat(UID_MAX_LENGTH + 1)).is_err());
    }
}
