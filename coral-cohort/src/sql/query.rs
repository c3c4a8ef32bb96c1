use super::{Expr, Ident, SqlFragment, SqlWriter, TableRef};

/// A complete statement
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select(Box<Select>),
    /// `UNION` of the branches (duplicates removed)
    Union(Vec<Query>),
    With {
        ctes: Vec<(Ident, Query)>,
        body: Box<Query>,
    },
    /// A statement rendered earlier, such as a cohort's stored statement
    Stored(SqlFragment),
}

impl Query {
    /// Render to SQL text and parameters
    pub fn render(&self) -> SqlFragment {
        let mut w = SqlWriter::new();
        self.write(&mut w);
        w.finish()
    }

    pub(crate) fn write(&self, w: &mut SqlWriter) {
        match self {
            Query::Select(select) => select.write(w),
            Query::Union(branches) => {
                w.join(branches, " UNION ", |w, branch| match branch {
                    Query::Select(select) => select.write(w),
                    // compound members must be simple selects
                    other => {
                        w.push("SELECT * FROM (");
                        other.write(w);
                        w.push(")");
                    }
                });
            }
            Query::With { ctes, body } => {
                w.push("WITH ");
                w.join(ctes, ", ", |w, (name, query)| {
                    w.push_ident(name);
                    w.push(" AS (");
                    query.write(w);
                    w.push(")");
                });
                w.push(" ");
                body.write(w);
            }
            Query::Stored(fragment) => w.embed(fragment),
        }
    }
}

impl From<Select> for Query {
    fn from(select: Select) -> Self {
        Query::Select(Box::new(select))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    All,
    /// `"alias".*`
    AllFrom(Ident),
    Expr { expr: Expr, alias: Option<Ident> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    Table(TableRef),
    Subquery(Box<Query>),
    /// A CTE defined by an enclosing `WITH`
    Named(Ident),
    /// `json_each(<expr>)` table-valued function
    JsonEach(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub relation: Relation,
    pub alias: Option<Ident>,
}

impl Source {
    pub fn table(table: TableRef, alias: Option<&Ident>) -> Self {
        Self {
            relation: Relation::Table(table),
            alias: alias.cloned(),
        }
    }

    pub fn subquery(query: impl Into<Query>, alias: &Ident) -> Self {
        Self {
            relation: Relation::Subquery(Box::new(query.into())),
            alias: Some(alias.clone()),
        }
    }

    pub fn named(name: &Ident) -> Self {
        Self {
            relation: Relation::Named(name.clone()),
            alias: None,
        }
    }

    pub fn json_each(expr: Expr, alias: &Ident) -> Self {
        Self {
            relation: Relation::JsonEach(expr),
            alias: Some(alias.clone()),
        }
    }

    fn write(&self, w: &mut SqlWriter) {
        match &self.relation {
            Relation::Table(table) => w.push(&table.to_string()),
            Relation::Subquery(query) => {
                w.push("(");
                query.write(w);
                w.push(")");
            }
            Relation::Named(name) => w.push_ident(name),
            Relation::JsonEach(expr) => {
                w.push("json_each(");
                expr.write(w);
                w.push(")");
            }
        }
        if let Some(alias) = &self.alias {
            w.push(" ");
            w.push_ident(alias);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub source: Source,
    pub on: Option<Expr>,
}

/// A single `SELECT` statement
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: Option<Source>,
    pub joins: Vec<Join>,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<Expr>,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn all(mut self) -> Self {
        self.items.push(SelectItem::All);
        self
    }

    pub fn all_from(mut self, alias: &Ident) -> Self {
        self.items.push(SelectItem::AllFrom(alias.clone()));
        self
    }

    pub fn item(mut self, expr: Expr) -> Self {
        self.items.push(SelectItem::Expr { expr, alias: None });
        self
    }

    pub fn item_as(mut self, expr: Expr, alias: &Ident) -> Self {
        self.items.push(SelectItem::Expr {
            expr,
            alias: Some(alias.clone()),
        });
        self
    }

    pub fn from(mut self, source: Source) -> Self {
        self.from = Some(source);
        self
    }

    pub fn join(mut self, kind: JoinKind, source: Source, on: Option<Expr>) -> Self {
        self.joins.push(Join { kind, source, on });
        self
    }

    /// Add a `WHERE` condition, AND-ing with any existing one
    pub fn filter(mut self, cond: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            None => cond,
            Some(existing) => Expr::And(vec![existing, cond]),
        });
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn having(mut self, cond: Expr) -> Self {
        self.having = Some(cond);
        self
    }

    pub fn order_by(mut self, expr: Expr) -> Self {
        self.order_by.push(expr);
        self
    }

    pub fn render(&self) -> SqlFragment {
        let mut w = SqlWriter::new();
        self.write(&mut w);
        w.finish()
    }

    fn write(&self, w: &mut SqlWriter) {
        w.push(if self.distinct { "SELECT DISTINCT " } else { "SELECT " });
        if self.items.is_empty() {
            w.push("*");
        }
        w.join(&self.items, ", ", |w, item| match item {
            SelectItem::All => w.push("*"),
            SelectItem::AllFrom(alias) => {
                w.push_ident(alias);
                w.push(".*");
            }
            SelectItem::Expr { expr, alias } => {
                expr.write(w);
                if let Some(alias) = alias {
                    w.push(" AS ");
                    w.push_ident(alias);
                }
            }
        });

        if let Some(from) = &self.from {
            w.push(" FROM ");
            from.write(w);
        }
        for join in &self.joins {
            w.push(match join.kind {
                JoinKind::Inner => " INNER JOIN ",
                JoinKind::LeftOuter => " LEFT OUTER JOIN ",
                JoinKind::Cross => " CROSS JOIN ",
            });
            join.source.write(w);
            if let Some(on) = &join.on {
                w.push(" ON ");
                on.write(w);
            }
        }
        if let Some(filter) = &self.filter {
            w.push(" WHERE ");
            filter.write(w);
        }
        if !self.group_by.is_empty() {
            w.push(" GROUP BY ");
            w.join(&self.group_by, ", ", |w, e| e.write(w));
        }
        if let Some(having) = &self.having {
            w.push(" HAVING ");
            having.write(w);
        }
        if !self.order_by.is_empty() {
            w.push(" ORDER BY ");
            w.join(&self.order_by, ", ", |w, e| e.write(w));
        }
    }
}
