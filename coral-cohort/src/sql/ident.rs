//! Validated SQL identifiers

use coral_common::db::is_valid_identifier;
use coral_common::{Error, Result};
use std::borrow::Cow;
use std::fmt;

/// A schema, table, column or alias name that is safe to double-quote into SQL text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(Cow<'static, str>);

impl Ident {
    /// Validate a caller-supplied name
    pub fn new(name: &str) -> Result<Self> {
        if is_valid_identifier(name) {
            Ok(Self(Cow::Owned(name.to_string())))
        } else {
            Err(Error::InvalidIdentifier(name.to_string()))
        }
    }

    /// A name known at compile time
    pub const fn fixed(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

/// A schema-qualified table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Ident,
    pub table: Ident,
}

impl TableRef {
    pub fn new(schema: &str, table: &str) -> Result<Self> {
        Ok(Self {
            schema: Ident::new(schema)?,
            table: Ident::new(table)?,
        })
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting() {
        assert_eq!(Ident::new("gender").unwrap().to_string(), "\"gender\"");
        assert_eq!(
            TableRef::new("tissue", "tdp_tissue").unwrap().to_string(),
            "\"tissue\".\"tdp_tissue\""
        );
    }

    #[test]
    fn test_rejects_injection() {
        let err = Ident::new("gender\" OR 1=1 --").unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
        assert!(TableRef::new("tissue", "tdp_tissue; DROP TABLE cohort").is_err());
    }
}
