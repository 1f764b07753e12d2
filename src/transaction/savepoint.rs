//! Savepoint naming and transaction configuration.

use std::fmt;

use parking_lot::Mutex;
use ulid::{Generator, Ulid};

use crate::transaction::error::{TransactionError, TransactionResult};

/// Longest identifier PostgreSQL keeps without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Length of a ULID in its text form.
const ULID_LEN: usize = 26;

/// Monotonic within the process, so names never repeat.
static GENERATOR: Mutex<Generator> = Mutex::new(Generator::new());

/// Check that `name` can be used as an unquoted SQL identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= MAX_IDENTIFIER_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Name of a savepoint opened for a nested transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SavepointName(String);

impl SavepointName {
    /// Generate a fresh name: `prefix` followed by a lowercased ULID.
    pub(crate) fn generate(prefix: &str) -> Self {
        let id = GENERATOR.lock().generate().unwrap_or_else(|_| Ulid::new());
        Self(format!("{}{}", prefix, id.to_string().to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SavepointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transaction layer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionConfig {
    /// Prefix of generated savepoint names.
    pub savepoint_prefix: String,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            savepoint_prefix: "sp_".into(),
        }
    }
}

impl TransactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the savepoint name prefix.
    pub fn savepoint_prefix(mut self, value: impl Into<String>) -> Self {
        self.savepoint_prefix = value.into();
        self
    }

    /// Check that generated names will be valid unquoted identifiers.
    pub fn validate(&self) -> TransactionResult<()> {
        let prefix = &self.savepoint_prefix;
        if prefix.len() + ULID_LEN > MAX_IDENTIFIER_LEN {
            return Err(TransactionError::InvalidConfig(format!(
                "savepoint prefix '{}' is longer than {} characters",
                prefix,
                MAX_IDENTIFIER_LEN - ULID_LEN
            )));
        }
        if !is_valid_identifier(prefix) {
            return Err(TransactionError::InvalidConfig(format!(
                "savepoint prefix '{}' is not a valid SQL identifier",
                prefix
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_generated_names_are_identifiers() {
        let name = SavepointName::generate("sp_");
        assert!(name.as_str().starts_with("sp_"));
        assert_eq!(name.as_str().len(), 3 + ULID_LEN);
        assert!(is_valid_identifier(name.as_str()));
        assert_eq!(name.as_str(), name.as_str().to_lowercase());
    }

    #[test]
    fn test_generated_names_are_unique() {
        let names: HashSet<_> = (0..1000).map(|_| SavepointName::generate("sp_")).collect();
        assert_eq!(names.len(), 1000);
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_valid_identifier("_x1"));
        assert!(is_valid_identifier("level_2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("sp-1"));
        assert!(!is_valid_identifier("sp 1"));
        assert!(!is_valid_identifier(&"a".repeat(64)));
    }

    #[test]
    fn test_config_validation() {
        assert!(TransactionConfig::default().validate().is_ok());
        assert!(TransactionConfig::new().savepoint_prefix("nest_").validate().is_ok());

        let err = TransactionConfig::new().savepoint_prefix("9x").validate().unwrap_err();
        assert!(matches!(err, TransactionError::InvalidConfig(_)));

        let err = TransactionConfig::new().savepoint_prefix("x; DROP").validate().unwrap_err();
        assert!(matches!(err, TransactionError::InvalidConfig(_)));

        let long = "p".repeat(MAX_IDENTIFIER_LEN - ULID_LEN + 1);
        assert!(TransactionConfig::new().savepoint_prefix(long).validate().is_err());
    }
}
