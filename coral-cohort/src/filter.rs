//! Filter specifications
//!
//! A [`FilterSpec`] is the validated, typed form of a derivation request. Parsing fails with
//! `MissingParameter`, `InvalidFilterValue`, `InvalidRange` or `InvalidIdentifier` before any
//! SQL is composed.

use crate::params::Params;
use crate::predicate::{parse_ranges, tokenize, EqualsSpec, Range, ValueKind, ValueToken};
use crate::sql::Ident;
use coral_common::{Error, Result};
use std::fmt;

/// Separator between the agents of one combination in the `agent` parameter
pub const AGENT_DELIMITER: &str = ", ";

/// Regimen number checked by "has (no) treatment" when none is given
pub const DEFAULT_REGIMEN: i64 = 1;

/// Derivation filters addressable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Equals,
    NumericRange,
    GeneEquals,
    GeneRange,
    DepletionRange,
    Treatment,
    Panel,
}

impl FilterKind {
    pub const ALL: [FilterKind; 7] = [
        FilterKind::Equals,
        FilterKind::NumericRange,
        FilterKind::GeneEquals,
        FilterKind::GeneRange,
        FilterKind::DepletionRange,
        FilterKind::Treatment,
        FilterKind::Panel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterKind::Equals => "equals",
            FilterKind::NumericRange => "num",
            FilterKind::GeneEquals => "gene-equals",
            FilterKind::GeneRange => "gene-num",
            FilterKind::DepletionRange => "depletion",
            FilterKind::Treatment => "treatment",
            FilterKind::Panel => "panel",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| Error::InvalidFilterValue(format!("unknown filter '{}'", name)))
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-gene score column, optionally restricted to one depletion screen
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSource {
    /// Score table name without its `tdp_` prefix
    pub table: String,
    pub attribute: Ident,
    pub ensg: String,
    pub screen: Option<String>,
}

impl ScoreSource {
    pub fn gene(params: &Params) -> Result<Self> {
        Ok(Self {
            table: params.required("table")?.to_string(),
            attribute: params.ident("attribute")?,
            ensg: params.required("ensg")?.to_string(),
            screen: None,
        })
    }

    pub fn depletion(params: &Params) -> Result<Self> {
        Ok(Self {
            screen: Some(params.required("depletionscreen")?.to_string()),
            ..Self::gene(params)?
        })
    }
}

/// Selection applied to a joined score
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreCriterion {
    Ranges(Vec<Range>),
    Equals(EqualsSpec),
}

/// Treatment filter
#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentSpec {
    /// Each entry is one agent combination; entities matching any combination qualify
    pub agent_sets: Vec<Vec<String>>,
    /// Entities without a treatment at the checked regimen
    pub null: bool,
    /// Entities with a treatment at the checked regimen
    pub not_null: bool,
    pub regimen: Option<i64>,
    /// Containment instead of exact set equality
    pub base_agent: bool,
}

impl TreatmentSpec {
    pub fn from_params(params: &Params) -> Result<Self> {
        let agent = params.optional("agent");
        let regimen = params.optional_int("regimen")?;
        if agent.is_none() && regimen.is_none() {
            return Err(Error::MissingParameter("agent or regimen".to_string()));
        }
        let base_agent = params.flag("baseAgent")?;

        let mut spec = TreatmentSpec {
            agent_sets: Vec::new(),
            null: false,
            not_null: false,
            regimen,
            base_agent,
        };
        for token in agent.map(tokenize).unwrap_or_default() {
            match token {
                ValueToken::Null => spec.null = true,
                ValueToken::NotNull => spec.not_null = true,
                ValueToken::Include(value) | ValueToken::Exclude(value) if value.is_empty() => {
                    return Err(Error::InvalidFilterValue("empty agent".to_string()));
                }
                ValueToken::Include(value) => spec.agent_sets.push(split_agents(&value)),
                // Agent names are matched literally, a leading '!' included
                ValueToken::Exclude(value) => {
                    spec.agent_sets.push(split_agents(&format!("!{}", value)))
                }
            }
        }
        Ok(spec)
    }

    /// Regimen checked by the null branch
    pub fn null_regimen(&self) -> i64 {
        self.regimen.unwrap_or(DEFAULT_REGIMEN)
    }
}

fn split_agents(value: &str) -> Vec<String> {
    let mut agents: Vec<String> = value.split(AGENT_DELIMITER).map(str::to_string).collect();
    agents.sort();
    agents.dedup();
    agents
}

/// A narrowing operation used to derive a child cohort
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSpec {
    Equals {
        attribute: Ident,
        spec: EqualsSpec,
    },
    NumericRange {
        attribute: Ident,
        ranges: Vec<Range>,
    },
    /// Gene-score and depletion-score filters
    Score {
        source: ScoreSource,
        criterion: ScoreCriterion,
    },
    Treatment(TreatmentSpec),
    PanelAnnotation {
        panel: String,
        spec: EqualsSpec,
    },
    /// Explicit entity-id list against the root entity table
    Membership {
        entity_ids: Vec<String>,
    },
}

impl FilterSpec {
    /// Parse the parameters of a named filter
    pub fn from_params(kind: FilterKind, params: &Params) -> Result<Self> {
        match kind {
            FilterKind::Equals => Ok(FilterSpec::Equals {
                attribute: params.ident("attribute")?,
                spec: equals_spec(params)?,
            }),
            FilterKind::NumericRange => Ok(FilterSpec::NumericRange {
                attribute: params.ident("attribute")?,
                ranges: parse_ranges(params.required("ranges")?)?,
            }),
            FilterKind::GeneEquals => Ok(FilterSpec::Score {
                source: ScoreSource::gene(params)?,
                criterion: ScoreCriterion::Equals(equals_spec(params)?),
            }),
            FilterKind::GeneRange => Ok(FilterSpec::Score {
                source: ScoreSource::gene(params)?,
                criterion: ScoreCriterion::Ranges(parse_ranges(params.required("ranges")?)?),
            }),
            FilterKind::DepletionRange => Ok(FilterSpec::Score {
                source: ScoreSource::depletion(params)?,
                criterion: ScoreCriterion::Ranges(parse_ranges(params.required("ranges")?)?),
            }),
            FilterKind::Treatment => Ok(FilterSpec::Treatment(TreatmentSpec::from_params(params)?)),
            FilterKind::Panel => Ok(FilterSpec::PanelAnnotation {
                panel: params.required("panel")?.to_string(),
                spec: EqualsSpec::parse(params.required("values")?, ValueKind::Boolean)?,
            }),
        }
    }
}

fn equals_spec(params: &Params) -> Result<EqualsSpec> {
    let kind = ValueKind::from_numeric_flag(params.flag("numeric")?);
    EqualsSpec::parse(params.required("values")?, kind)
}
