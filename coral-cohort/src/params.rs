//! Request parameter access
//!
//! Operations receive their inputs as a flat string map, as collected from query strings.
//! Presence is checked before any SQL is composed.

use crate::predicate::parse_flag;
use crate::sql::Ident;
use coral_common::{Error, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Params(HashMap<String, String>);

impl Params {
    pub fn new(map: HashMap<String, String>) -> Self {
        Self(map)
    }

    pub fn optional(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn required(&self, key: &str) -> Result<&str> {
        self.optional(key)
            .ok_or_else(|| Error::MissingParameter(key.to_string()))
    }

    /// A required identifier (attribute, schema, table)
    pub fn ident(&self, key: &str) -> Result<Ident> {
        Ident::new(self.required(key)?)
    }

    pub fn flag(&self, key: &str) -> Result<bool> {
        parse_flag(self.required(key)?)
            .map_err(|_| Error::InvalidFilterValue(format!("{} must be 'true' or 'false'", key)))
    }

    pub fn int(&self, key: &str) -> Result<i64> {
        parse_int(key, self.required(key)?)
    }

    pub fn optional_int(&self, key: &str) -> Result<Option<i64>> {
        self.optional(key).map(|v| parse_int(key, v)).transpose()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn parse_int(key: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidFilterValue(format!("{} must be an integer, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_and_typed_access() {
        let params: Params = [("cohortId", "4"), ("numeric", "TRUE"), ("attribute", "age")]
            .into_iter()
            .collect();
        assert_eq!(params.int("cohortId").unwrap(), 4);
        assert!(params.flag("numeric").unwrap());
        assert_eq!(params.ident("attribute").unwrap().as_str(), "age");
        assert_eq!(params.optional_int("regimen").unwrap(), None);

        assert!(matches!(params.required("values"), Err(Error::MissingParameter(k)) if k == "values"));
    }

    #[test]
    fn test_malformed_values() {
        let params: Params = [("cohortId", "four"), ("numeric", "1"), ("attribute", "a b")]
            .into_iter()
            .collect();
        assert!(matches!(params.int("cohortId"), Err(Error::InvalidFilterValue(_))));
        assert!(matches!(params.flag("numeric"), Err(Error::InvalidFilterValue(_))));
        assert!(matches!(params.ident("attribute"), Err(Error::InvalidIdentifier(_))));
    }
}
