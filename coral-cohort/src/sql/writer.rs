use super::{Ident, SqlFragment};
use coral_common::db::SqlValue;

/// Accumulates SQL text and parameters in lockstep
#[derive(Debug, Default)]
pub struct SqlWriter {
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    pub fn push_ident(&mut self, ident: &Ident) {
        self.sql.push_str(&ident.to_string());
    }

    /// Emit a placeholder bound to `value`
    pub fn bind(&mut self, value: SqlValue) {
        self.sql.push('?');
        self.params.push(value);
    }

    /// Emit a previously rendered fragment, carrying its parameters along
    pub fn embed(&mut self, fragment: &SqlFragment) {
        self.sql.push_str(&fragment.sql);
        self.params.extend(fragment.params.iter().cloned());
    }

    /// Emit `items` separated by `sep`
    pub fn join<T>(&mut self, items: &[T], sep: &str, mut each: impl FnMut(&mut Self, &T)) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(sep);
            }
            each(self, item);
        }
    }

    pub fn finish(self) -> SqlFragment {
        SqlFragment {
            sql: self.sql,
            params: self.params,
        }
    }
}
