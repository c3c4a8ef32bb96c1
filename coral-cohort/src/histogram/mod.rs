//! Histograms over a cohort
//!
//! Query construction lives in [`sql`], bin reconciliation in [`format`]. Numeric bin edges
//! and the category set always come from the reference population (the whole entity table,
//! or all scores of the requested gene), so every cohort of a lineage shares them.

pub mod format;
pub mod sql;

pub use format::{format_categories, format_number, format_numeric, HistogramBin, RawBin};
pub use sql::{HistogramQuery, NULL_CATEGORY};

use crate::filter::ScoreSource;
use crate::params::Params;
use crate::sql::Ident;
use coral_common::{Error, Result};
use serde::Serialize;

/// Histogram types addressable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistogramKind {
    DataCat,
    DataNum,
    GeneScoreCat,
    GeneScoreNum,
    DepletionScore,
    PanelAnnotation,
}

impl HistogramKind {
    pub const ALL: [HistogramKind; 6] = [
        HistogramKind::DataCat,
        HistogramKind::DataNum,
        HistogramKind::GeneScoreCat,
        HistogramKind::GeneScoreNum,
        HistogramKind::DepletionScore,
        HistogramKind::PanelAnnotation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HistogramKind::DataCat => "dataCat",
            HistogramKind::DataNum => "dataNum",
            HistogramKind::GeneScoreCat => "geneScoreCat",
            HistogramKind::GeneScoreNum => "geneScoreNum",
            HistogramKind::DepletionScore => "depletionScore",
            HistogramKind::PanelAnnotation => "panelAnnotation",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| Error::InvalidFilterValue(format!("unknown histogram type '{}'", name)))
    }
}

/// Validated histogram request
#[derive(Debug, Clone, PartialEq)]
pub enum HistogramRequest {
    Categorical { attribute: Ident },
    Numeric { attribute: Ident },
    ScoreCategorical(ScoreSource),
    ScoreNumeric(ScoreSource),
    Panel { panel: String },
}

impl HistogramRequest {
    pub fn from_params(kind: HistogramKind, params: &Params) -> Result<Self> {
        Ok(match kind {
            HistogramKind::DataCat => HistogramRequest::Categorical {
                attribute: params.ident("attribute")?,
            },
            HistogramKind::DataNum => HistogramRequest::Numeric {
                attribute: params.ident("attribute")?,
            },
            HistogramKind::GeneScoreCat => HistogramRequest::ScoreCategorical(ScoreSource::gene(params)?),
            HistogramKind::GeneScoreNum => HistogramRequest::ScoreNumeric(ScoreSource::gene(params)?),
            HistogramKind::DepletionScore => {
                HistogramRequest::ScoreNumeric(ScoreSource::depletion(params)?)
            }
            HistogramKind::PanelAnnotation => HistogramRequest::Panel {
                panel: params.required("panel")?.to_string(),
            },
        })
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            HistogramRequest::Numeric { .. } | HistogramRequest::ScoreNumeric(_)
        )
    }
}

/// One category and its count in the cohort
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub bin: String,
    pub count: i64,
}

/// A formatted histogram
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Histogram {
    Numeric(Vec<HistogramBin>),
    Categorical(Vec<CategoryCount>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        for kind in HistogramKind::ALL {
            assert_eq!(HistogramKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(matches!(
            HistogramKind::parse("pie"),
            Err(Error::InvalidFilterValue(_))
        ));
    }

    #[test]
    fn test_request_parameters() {
        let params: Params = [("attribute", "age")].into_iter().collect();
        let request = HistogramRequest::from_params(HistogramKind::DataNum, &params).unwrap();
        assert!(request.is_numeric());

        let err = HistogramRequest::from_params(HistogramKind::PanelAnnotation, &params).unwrap_err();
        assert!(matches!(err, Error::MissingParameter(k) if k == "panel"));

        let err = HistogramRequest::from_params(HistogramKind::DepletionScore, &params).unwrap_err();
        assert!(matches!(err, Error::MissingParameter(_)));
    }
}
