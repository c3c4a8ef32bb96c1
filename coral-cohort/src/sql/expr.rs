use super::{Ident, Query, SqlWriter};
use coral_common::db::SqlValue;

/// Storage classes usable in `CAST`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Real,
    Integer,
}

impl SqlType {
    fn keyword(self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Real => "REAL",
            SqlType::Integer => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Min,
    Max,
    Coalesce,
    JsonExtract,
}

impl Func {
    fn name(self) -> &'static str {
        match self {
            Func::Min => "MIN",
            Func::Max => "MAX",
            Func::Coalesce => "COALESCE",
            Func::JsonExtract => "json_extract",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// SQL scalar and boolean expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column {
        qualifier: Option<Ident>,
        name: Ident,
    },
    /// Output column or CTE name without qualifier
    Name(Ident),
    Value(SqlValue),
    Null,
    Cast {
        expr: Box<Expr>,
        ty: SqlType,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
    CountAll,
    CountDistinct(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// `<expr> IN (<subquery>)`
    InQuery {
        expr: Box<Expr>,
        query: Box<Query>,
        negated: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Case {
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
}

impl Expr {
    /// `"qualifier"."name"`
    pub fn col(qualifier: &Ident, name: &Ident) -> Self {
        Expr::Column {
            qualifier: Some(qualifier.clone()),
            name: name.clone(),
        }
    }

    pub fn value(value: impl Into<SqlValue>) -> Self {
        Expr::Value(value.into())
    }

    pub fn cast(self, ty: SqlType) -> Self {
        Expr::Cast {
            expr: Box::new(self),
            ty,
        }
    }

    pub fn call(func: Func, args: Vec<Expr>) -> Self {
        Expr::Call { func, args }
    }

    pub fn binary(self, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    pub fn equals(self, right: Expr) -> Self {
        self.binary(BinaryOp::Eq, right)
    }

    pub fn in_list(self, list: Vec<Expr>, negated: bool) -> Self {
        Expr::InList {
            expr: Box::new(self),
            list,
            negated,
        }
    }

    pub fn in_query(self, query: impl Into<Query>, negated: bool) -> Self {
        Expr::InQuery {
            expr: Box::new(self),
            query: Box::new(query.into()),
            negated,
        }
    }

    pub fn is_null(self, negated: bool) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated,
        }
    }

    /// Conjunction, flattening single-element lists
    pub fn all(mut parts: Vec<Expr>) -> Self {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::And(parts)
        }
    }

    /// Disjunction, flattening single-element lists
    pub fn any(mut parts: Vec<Expr>) -> Self {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::Or(parts)
        }
    }

    pub(crate) fn write(&self, w: &mut SqlWriter) {
        match self {
            Expr::Column { qualifier, name } => {
                if let Some(q) = qualifier {
                    w.push_ident(q);
                    w.push(".");
                }
                w.push_ident(name);
            }
            Expr::Name(name) => w.push_ident(name),
            Expr::Value(v) => w.bind(v.clone()),
            Expr::Null => w.push("NULL"),
            Expr::Cast { expr, ty } => {
                w.push("CAST(");
                expr.write(w);
                w.push(" AS ");
                w.push(ty.keyword());
                w.push(")");
            }
            Expr::Call { func, args } => {
                w.push(func.name());
                w.push("(");
                w.join(args, ", ", |w, a| a.write(w));
                w.push(")");
            }
            Expr::CountAll => w.push("COUNT(*)"),
            Expr::CountDistinct(expr) => {
                w.push("COUNT(DISTINCT ");
                expr.write(w);
                w.push(")");
            }
            Expr::Binary { op, left, right } => {
                w.push("(");
                left.write(w);
                w.push(" ");
                w.push(op.symbol());
                w.push(" ");
                right.write(w);
                w.push(")");
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                if list.is_empty() {
                    w.push(if *negated { "(1 = 1)" } else { "(1 = 0)" });
                    return;
                }
                w.push("(");
                expr.write(w);
                w.push(if *negated { " NOT IN (" } else { " IN (" });
                w.join(list, ", ", |w, e| e.write(w));
                w.push("))");
            }
            Expr::InQuery {
                expr,
                query,
                negated,
            } => {
                w.push("(");
                expr.write(w);
                w.push(if *negated { " NOT IN (" } else { " IN (" });
                query.write(w);
                w.push("))");
            }
            Expr::IsNull { expr, negated } => {
                w.push("(");
                expr.write(w);
                w.push(if *negated { " IS NOT NULL)" } else { " IS NULL)" });
            }
            Expr::And(parts) => write_junction(w, parts, " AND ", "(1 = 1)"),
            Expr::Or(parts) => write_junction(w, parts, " OR ", "(1 = 0)"),
            Expr::Case {
                branches,
                otherwise,
            } => {
                w.push("CASE");
                for (when, then) in branches {
                    w.push(" WHEN ");
                    when.write(w);
                    w.push(" THEN ");
                    then.write(w);
                }
                if let Some(other) = otherwise {
                    w.push(" ELSE ");
                    other.write(w);
                }
                w.push(" END");
            }
        }
    }
}

fn write_junction(w: &mut SqlWriter, parts: &[Expr], sep: &str, empty: &str) {
    if parts.is_empty() {
        w.push(empty);
        return;
    }
    w.push("(");
    w.join(parts, sep, |w, e| e.write(w));
    w.push(")");
}
