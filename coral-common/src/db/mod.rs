//! Database pools, registry schema and models

pub mod init;
pub mod models;
pub mod pools;
pub mod value;

pub use init::*;
pub use models::*;
pub use pools::*;
pub use value::*;

/// Longest accepted schema, table or column name
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Validate a schema, table or column name
///
/// Only ASCII letters, digits and underscore are accepted, so a validated name can be
/// double-quoted into SQL text without escaping.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_alphabet() {
        assert!(is_valid_identifier("tdp_tissue"));
        assert!(is_valid_identifier("Age2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("age; DROP TABLE cohort"));
        assert!(!is_valid_identifier("tissue.tdp_tissue"));
        assert!(!is_valid_identifier("\"x\""));
        assert!(!is_valid_identifier(&"a".repeat(64)));
    }
}
