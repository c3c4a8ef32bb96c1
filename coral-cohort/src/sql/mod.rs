//! Parameterized SQL construction
//!
//! Statements are built as a tree of [`Query`], [`Select`] and [`Expr`] nodes and rendered
//! to SQL text with positional `?` placeholders. Identifiers are validated [`Ident`]s and
//! every literal becomes a bound parameter, so no caller-supplied text is ever spliced into
//! a statement. A rendered [`SqlFragment`] can be embedded into a larger tree; its
//! parameters are spliced in at the embedding position, which keeps arbitrarily deep
//! nesting of stored cohort statements correct.

mod expr;
mod ident;
mod query;
mod writer;

pub use expr::{BinaryOp, Expr, Func, SqlType};
pub use ident::{Ident, TableRef};
pub use query::{Join, JoinKind, Query, Relation, Select, SelectItem, Source};
pub use writer::SqlWriter;

use coral_common::db::SqlValue;

/// Rendered SQL text plus its bound parameters, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Number of `?` placeholders outside string literals and quoted identifiers
    pub fn placeholder_count(&self) -> usize {
        let mut count = 0;
        let mut quote: Option<char> = None;
        for c in self.sql.chars() {
            match (quote, c) {
                (None, '\'') | (None, '"') => quote = Some(c),
                (Some(q), c) if c == q => quote = None,
                (None, '?') => count += 1,
                _ => {}
            }
        }
        count
    }
}
