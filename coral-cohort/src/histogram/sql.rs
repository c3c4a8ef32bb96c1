//! Histogram statements
//!
//! Every histogram is computed from two single-column relations of values `v`: the
//! reference population and the cohort. Categorical histograms left-join the cohort counts
//! onto the distinct reference categories; numeric histograms bucket the cohort values
//! against the reference min/max.

use super::HistogramRequest;
use crate::composer::{join_panel, root_query, stored, Composer, COHORT_SCORE, SCORE};
use crate::entity::EntitySource;
use crate::filter::ScoreSource;
use crate::sql::{
    BinaryOp, Expr, Func, Ident, JoinKind, Query, Select, Source, SqlFragment, SqlType,
};
use coral_common::db::Cohort;
use coral_common::Result;

const V: Ident = Ident::fixed("v");
const Q: Ident = Ident::fixed("q");
const R: Ident = Ident::fixed("r");
const C: Ident = Ident::fixed("c");
const CAT: Ident = Ident::fixed("cat");
const BIN: Ident = Ident::fixed("bin");
const ATTR: Ident = Ident::fixed("attr");
const COUNT: Ident = Ident::fixed("count");
const MIN: Ident = Ident::fixed("min");
const MAX: Ident = Ident::fixed("max");
const CATEGORIES: Ident = Ident::fixed("categories");
const C_STATS: Ident = Ident::fixed("c_stats");

/// Label of NULL values in categorical histograms
pub const NULL_CATEGORY: &str = "null";

/// Statement builder for one histogram request
pub struct HistogramQuery<'a> {
    composer: &'a Composer,
    cohort: &'a Cohort,
    source: EntitySource,
}

impl<'a> HistogramQuery<'a> {
    pub fn new(composer: &'a Composer, cohort: &'a Cohort) -> Result<Self> {
        Ok(Self {
            composer,
            cohort,
            source: EntitySource::of(cohort)?,
        })
    }

    /// Categorical: `(bin, count)` rows; numeric: `(bin, min, max, count)` rows
    pub fn build(&self, request: &HistogramRequest, num_bins: u32) -> Result<SqlFragment> {
        let base = root_query(&self.source.table);
        let cohort = stored(self.cohort);
        Ok(match request {
            HistogramRequest::Categorical { attribute } => categorical(
                column_values(base, attribute),
                column_values(cohort, attribute),
            ),
            HistogramRequest::Numeric { attribute } => numeric(
                column_values(base, attribute),
                column_values(cohort, attribute),
                num_bins,
            ),
            HistogramRequest::ScoreCategorical(score) => categorical(
                self.score_values(base, score)?,
                self.score_values(cohort, score)?,
            ),
            HistogramRequest::ScoreNumeric(score) => {
                // bin edges span every score of the gene, not only the entity table
                let reference = Select::new()
                    .item_as(Expr::col(&R, &SCORE), &V)
                    .from(Source::subquery(
                        self.composer.score_subquery(&self.source, score)?,
                        &R,
                    ));
                numeric(reference, self.score_values(cohort, score)?, num_bins)
            }
            HistogramRequest::Panel { panel } => categorical(
                self.panel_values(base, panel)?,
                self.panel_values(cohort, panel)?,
            ),
        })
    }

    fn score_values(&self, relation: Query, score: &ScoreSource) -> Result<Select> {
        Ok(self
            .composer
            .join_scores(relation, &self.source, score)?
            .item_as(Expr::col(&COHORT_SCORE, &SCORE), &V))
    }

    fn panel_values(&self, relation: Query, panel: &str) -> Result<Select> {
        let (select, score) = join_panel(relation, &self.source, panel)?;
        let label = Expr::Case {
            branches: vec![(score, Expr::value("true"))],
            otherwise: Some(Box::new(Expr::value("false"))),
        };
        Ok(select.item_as(label, &V))
    }
}

/// `SELECT q.<attribute> AS v FROM (<relation>) q`
fn column_values(relation: Query, attribute: &Ident) -> Select {
    Select::new()
        .item_as(Expr::col(&Q, attribute), &V)
        .from(Source::subquery(relation, &Q))
}

fn category_label(values: &Ident) -> Expr {
    Expr::call(
        Func::Coalesce,
        vec![
            Expr::col(values, &V).cast(SqlType::Text),
            Expr::value(NULL_CATEGORY),
        ],
    )
}

fn categorical(reference: Select, cohort: Select) -> SqlFragment {
    let categories = Select::new()
        .distinct()
        .item_as(category_label(&R), &CAT)
        .from(Source::subquery(reference, &R));
    let counts = Select::new()
        .item_as(category_label(&Q), &ATTR)
        .item_as(Expr::CountAll, &COUNT)
        .from(Source::subquery(cohort, &Q))
        .group_by(Expr::Name(ATTR));
    let body = Select::new()
        .item_as(Expr::col(&CATEGORIES, &CAT), &BIN)
        .item_as(Expr::col(&C, &COUNT), &COUNT)
        .from(Source::named(&CATEGORIES))
        .join(
            JoinKind::LeftOuter,
            Source::subquery(counts, &C),
            Some(Expr::col(&CATEGORIES, &CAT).equals(Expr::col(&C, &ATTR))),
        )
        .order_by(Expr::col(&CATEGORIES, &CAT));

    Query::With {
        ctes: vec![(CATEGORIES, categories.into())],
        body: Box::new(body.into()),
    }
    .render()
}

/// Width bucket of `x` over the reference statistics
///
/// NULL stays NULL, values below min go to 0, values at or above max to `n + 1`.
fn bucket(x: Expr, num_bins: u32) -> Expr {
    let n = i64::from(num_bins);
    let min = Expr::col(&C_STATS, &MIN);
    let max = Expr::col(&C_STATS, &MAX);
    let scaled = x
        .clone()
        .binary(BinaryOp::Sub, min.clone())
        .binary(BinaryOp::Mul, Expr::value(n))
        .binary(BinaryOp::Div, max.clone().binary(BinaryOp::Sub, min.clone()))
        .cast(SqlType::Integer)
        .binary(BinaryOp::Add, Expr::value(1_i64));
    Expr::Case {
        branches: vec![
            (x.clone().is_null(false), Expr::Null),
            (x.clone().binary(BinaryOp::Lt, min), Expr::value(0_i64)),
            (x.binary(BinaryOp::Gte, max), Expr::value(n + 1)),
        ],
        otherwise: Some(Box::new(scaled)),
    }
}

fn numeric(reference: Select, cohort: Select, num_bins: u32) -> SqlFragment {
    let stats = Select::new()
        .item_as(
            Expr::call(Func::Min, vec![Expr::col(&R, &V)]).cast(SqlType::Real),
            &MIN,
        )
        .item_as(
            Expr::call(Func::Max, vec![Expr::col(&R, &V)]).cast(SqlType::Real),
            &MAX,
        )
        .from(Source::subquery(reference, &R));
    let body = Select::new()
        .item_as(bucket(Expr::col(&Q, &V), num_bins), &BIN)
        .item_as(Expr::call(Func::Min, vec![Expr::col(&C_STATS, &MIN)]), &MIN)
        .item_as(Expr::call(Func::Max, vec![Expr::col(&C_STATS, &MAX)]), &MAX)
        .item_as(Expr::CountAll, &COUNT)
        .from(Source::subquery(cohort, &Q))
        .join(JoinKind::Cross, Source::named(&C_STATS), None)
        .group_by(Expr::Name(BIN))
        .order_by(Expr::Name(BIN));

    Query::With {
        ctes: vec![(C_STATS, stats.into())],
        body: Box::new(body.into()),
    }
    .render()
}
