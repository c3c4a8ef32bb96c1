//! Statement composer
//!
//! Builds standalone cohort statements. A derived statement always wraps the parent's
//! stored statement as a derived table, so every statement embeds its full ancestry and can
//! be executed without consulting the registry.

use crate::entity::EntitySource;
use crate::filter::{FilterSpec, ScoreCriterion, ScoreSource, TreatmentSpec};
use crate::predicate::ranges_to_expr;
use crate::sql::{Expr, Func, Ident, JoinKind, Query, Select, Source, SqlFragment, SqlType, TableRef};
use coral_common::config::CatalogConfig;
use coral_common::db::{Cohort, NewCohort};
use coral_common::{Error, Result};
use tracing::debug;

pub(crate) const P: Ident = Ident::fixed("p");
pub(crate) const COHORT: Ident = Ident::fixed("cohort");
pub(crate) const COHORT_SCORE: Ident = Ident::fixed("cohort_score");
pub(crate) const SCORE: Ident = Ident::fixed("score");
const ATTR: Ident = Ident::fixed("attr");
const GENE: Ident = Ident::fixed("gene");
const ENSG: Ident = Ident::fixed("ensg");
const SPECIES: Ident = Ident::fixed("species");
const DEPLETION_SCREEN: Ident = Ident::fixed("depletionscreen");
const PANEL: Ident = Ident::fixed("panel");
const A: Ident = Ident::fixed("a");
const D: Ident = Ident::fixed("d");
const T: Ident = Ident::fixed("t");
const E: Ident = Ident::fixed("e");
const X: Ident = Ident::fixed("x");
const BASE: Ident = Ident::fixed("base");
const NNT: Ident = Ident::fixed("nnt");
const REFINED: Ident = Ident::fixed("refined");
const TREATMENT: Ident = Ident::fixed("treatment");
const VALUE: Ident = Ident::fixed("value");
const RN: Ident = Ident::fixed("rn");
const AG: Ident = Ident::fixed("ag");
const SIZE: Ident = Ident::fixed("size");

const AGENT_PATH: &str = "$.AGENT";
const REGIMEN_PATH: &str = "$.REGIMEN_NUMBER";

/// The stored statement of a cohort as an embeddable query
pub fn stored(cohort: &Cohort) -> Query {
    Query::Stored(SqlFragment::new(cohort.statement.clone(), cohort.parameters.clone()))
}

/// `SELECT * FROM "schema"."table"`
pub fn root_query(table: &TableRef) -> Query {
    Select::new().all().from(Source::table(table.clone(), None)).into()
}

/// Column type used when reading an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Number,
    Categorical,
}

/// Composes cohort statements and the read queries run against them
#[derive(Debug, Clone)]
pub struct Composer {
    catalog: TableRef,
    species: String,
}

impl Composer {
    pub fn new(catalog: &CatalogConfig) -> Result<Self> {
        Ok(Self {
            catalog: TableRef::new(&catalog.schema, &catalog.table)?,
            species: catalog.species.clone(),
        })
    }

    /// A root cohort over a whole entity table
    pub fn root(
        &self,
        name: &str,
        is_initial: bool,
        previous_cohort: i64,
        source: &EntitySource,
    ) -> NewCohort {
        let statement = root_query(&source.table).render();
        NewCohort {
            name: name.to_string(),
            is_initial: i64::from(is_initial),
            previous_cohort,
            entity_database: source.database.clone(),
            entity_schema: source.table.schema.as_str().to_string(),
            entity_table: source.table.table.as_str().to_string(),
            statement: statement.sql,
            parameters: statement.params,
            members: Vec::new(),
        }
    }

    /// Compose a child of `parent` without persisting it
    ///
    /// The entity source is copied unchanged; the parent row is never modified.
    pub fn derive(&self, parent: &Cohort, name: &str, filter: &FilterSpec) -> Result<NewCohort> {
        let statement = self.filter_statement(parent, filter)?;
        debug!(parent = parent.id, sql = %statement.sql, "Composed derived statement");

        let members = match filter {
            FilterSpec::Membership { entity_ids } => entity_ids.clone(),
            _ => Vec::new(),
        };
        Ok(NewCohort {
            name: name.to_string(),
            is_initial: 0,
            previous_cohort: parent.id,
            entity_database: parent.entity_database.clone(),
            entity_schema: parent.entity_schema.clone(),
            entity_table: parent.entity_table.clone(),
            statement: statement.sql,
            parameters: statement.params,
            members,
        })
    }

    /// The statement selecting the rows of `parent` that pass `filter`
    pub fn filter_statement(&self, parent: &Cohort, filter: &FilterSpec) -> Result<SqlFragment> {
        let source = EntitySource::of(parent)?;
        let select = match filter {
            FilterSpec::Equals { attribute, spec } => {
                wrap(parent).filter(spec.to_expr(&Expr::col(&P, attribute)))
            }
            FilterSpec::NumericRange { attribute, ranges } => {
                wrap(parent).filter(ranges_to_expr(ranges, &Expr::col(&P, attribute)))
            }
            FilterSpec::Score {
                source: score,
                criterion,
            } => {
                let target = Expr::col(&COHORT_SCORE, &SCORE);
                let cond = match criterion {
                    ScoreCriterion::Ranges(ranges) => ranges_to_expr(ranges, &target),
                    ScoreCriterion::Equals(spec) => spec.to_expr(&target),
                };
                self.join_scores(stored(parent), &source, score)?
                    .all_from(&COHORT)
                    .filter(cond)
            }
            FilterSpec::Treatment(spec) => treatment_select(parent, &source, spec)?,
            FilterSpec::PanelAnnotation { panel, spec } => {
                let (select, score) = join_panel(stored(parent), &source, panel)?;
                select.all_from(&COHORT).filter(spec.to_expr(&score))
            }
            FilterSpec::Membership { entity_ids } => {
                let id = source.id_column()?;
                // one JSON array parameter regardless of cluster size
                let list = serde_json::to_string(entity_ids)
                    .map_err(|e| Error::InvalidFilterValue(format!("entity ids: {}", e)))?;
                let members = Select::new()
                    .item(Expr::col(&E, &VALUE))
                    .from(Source::json_each(Expr::value(list), &E));
                Select::new()
                    .all_from(&P)
                    .from(Source::subquery(root_query(&source.table), &P))
                    .filter(Expr::col(&P, &id).in_query(members, false))
            }
        };
        Ok(select.render())
    }

    /// All rows of a statement, or the entity id plus one attribute
    pub fn data_query(
        &self,
        parent: &Cohort,
        statement: SqlFragment,
        attribute: Option<&Ident>,
    ) -> Result<SqlFragment> {
        let Some(attribute) = attribute else {
            return Ok(statement);
        };
        let id = EntitySource::of(parent)?.id_column()?;
        Ok(Select::new()
            .item_as(Expr::col(&P, &id), &id)
            .item_as(Expr::col(&P, attribute), attribute)
            .from(Source::subquery(Query::Stored(statement), &P))
            .render())
    }

    /// Row count of a statement
    pub fn size_query(&self, statement: SqlFragment) -> SqlFragment {
        Select::new()
            .item_as(Expr::CountAll, &SIZE)
            .from(Source::subquery(Query::Stored(statement), &P))
            .render()
    }

    /// `(entity id, score)` rows for the cohort; entities without a score get NULL
    pub fn score_query(&self, parent: &Cohort, score: &ScoreSource) -> Result<SqlFragment> {
        let source = EntitySource::of(parent)?;
        let id = source.score_id_column()?;
        Ok(self
            .join_scores(stored(parent), &source, score)?
            .item_as(Expr::col(&COHORT, &id), &id)
            .item_as(Expr::col(&COHORT_SCORE, &SCORE), &SCORE)
            .render())
    }

    /// `(entity id, score)` rows where score is true for panel members, false otherwise
    pub fn panel_query(&self, parent: &Cohort, panel: &str) -> Result<SqlFragment> {
        let source = EntitySource::of(parent)?;
        let id = source.id_column()?;
        let (select, score) = join_panel(stored(parent), &source, panel)?;
        Ok(select
            .item_as(Expr::col(&COHORT, &id), &id)
            .item_as(score, &SCORE)
            .render())
    }

    /// Entity id (as text) plus typed attributes, for rows where every attribute is set
    pub fn attributes_query(
        &self,
        parent: &Cohort,
        attributes: &[(Ident, AttributeType)],
    ) -> Result<SqlFragment> {
        let id = EntitySource::of(parent)?.id_column()?;
        let mut select = Select::new()
            .item_as(Expr::col(&P, &id).cast(SqlType::Text), &id)
            .from(Source::subquery(stored(parent), &P));
        for (attribute, ty) in attributes {
            let column = Expr::col(&P, attribute);
            let ty = match ty {
                AttributeType::Number => SqlType::Real,
                AttributeType::Categorical => SqlType::Text,
            };
            select = select
                .item_as(column.clone().cast(ty), attribute)
                .filter(column.is_null(true));
        }
        Ok(select.render())
    }

    /// `(gene) score` subquery: `(id, score)` for one gene, optionally one depletion screen
    pub(crate) fn score_subquery(&self, source: &EntitySource, score: &ScoreSource) -> Result<Select> {
        let id = source.score_id_column()?;
        let table = source.score_table(&score.table)?;
        let mut select = Select::new()
            .item_as(Expr::col(&ATTR, &id), &id)
            .item_as(Expr::col(&ATTR, &score.attribute), &SCORE)
            .from(Source::table(table, Some(&ATTR)))
            .join(
                JoinKind::Inner,
                Source::table(self.catalog.clone(), Some(&GENE)),
                Some(Expr::col(&ATTR, &ENSG).equals(Expr::col(&GENE, &ENSG))),
            )
            .filter(Expr::col(&GENE, &SPECIES).equals(Expr::value(self.species.as_str())))
            .filter(Expr::col(&ATTR, &ENSG).equals(Expr::value(score.ensg.as_str())));
        if let Some(screen) = &score.screen {
            select = select.filter(Expr::col(&ATTR, &DEPLETION_SCREEN).equals(Expr::value(screen.as_str())));
        }
        Ok(select)
    }

    /// `FROM (<parent>) cohort LEFT OUTER JOIN (<scores>) cohort_score`, no select list
    pub(crate) fn join_scores(
        &self,
        parent: Query,
        source: &EntitySource,
        score: &ScoreSource,
    ) -> Result<Select> {
        let id = source.score_id_column()?;
        let scores = self.score_subquery(source, score)?;
        Ok(Select::new()
            .from(Source::subquery(parent, &COHORT))
            .join(
                JoinKind::LeftOuter,
                Source::subquery(scores, &COHORT_SCORE),
                Some(Expr::col(&COHORT, &id).equals(Expr::col(&COHORT_SCORE, &id))),
            ))
    }
}

/// `SELECT "p".* FROM (<parent>) "p"`
fn wrap(parent: &Cohort) -> Select {
    Select::new().all_from(&P).from(Source::subquery(stored(parent), &P))
}

/// `(id, true)` for the members of a panel
fn panel_subquery(source: &EntitySource, panel: &str) -> Result<Select> {
    let (id, table) = source.panel()?;
    Ok(Select::new()
        .distinct()
        .item_as(Expr::col(&A, &id), &id)
        .item_as(Expr::value(true), &SCORE)
        .from(Source::table(table, Some(&A)))
        .filter(Expr::col(&A, &PANEL).equals(Expr::value(panel))))
}

/// Panel membership of an entity, absent assignments defaulting to false
fn panel_score(alias: &Ident) -> Expr {
    Expr::call(
        Func::Coalesce,
        vec![Expr::col(alias, &SCORE), Expr::value(false)],
    )
}

/// `FROM (<parent>) cohort LEFT OUTER JOIN (<panel>) d` plus the defaulted score expression
pub(crate) fn join_panel(parent: Query, source: &EntitySource, panel: &str) -> Result<(Select, Expr)> {
    let (id, _) = source.panel()?;
    let select = Select::new()
        .from(Source::subquery(parent, &COHORT))
        .join(
            JoinKind::LeftOuter,
            Source::subquery(panel_subquery(source, panel)?, &D),
            Some(Expr::col(&COHORT, &id).equals(Expr::col(&D, &id))),
        );
    Ok((select, panel_score(&D)))
}

/// One row per (entity, treatment element): entity id, regimen number, agent
fn treatment_rows(source: &EntitySource, id: &Ident) -> Select {
    let element = Expr::col(&E, &VALUE);
    Select::new()
        .item_as(Expr::col(&T, id), id)
        .item_as(
            Expr::call(Func::JsonExtract, vec![element.clone(), Expr::value(REGIMEN_PATH)])
                .cast(SqlType::Integer),
            &RN,
        )
        .item_as(
            Expr::call(Func::JsonExtract, vec![element, Expr::value(AGENT_PATH)]),
            &AG,
        )
        .from(Source::table(source.table.clone(), Some(&T)))
        .join(
            JoinKind::Cross,
            Source::json_each(Expr::col(&T, &TREATMENT), &E),
            None,
        )
}

/// Distinct entity ids from the expanded treatment rows
fn treated_ids(source: &EntitySource, id: &Ident) -> Select {
    Select::new()
        .distinct()
        .item_as(Expr::col(&X, id), id)
        .from(Source::subquery(treatment_rows(source, id), &X))
}

/// Agent-combination test for one regimen group
fn agent_set_matches(agents: &[String], base_agent: bool) -> Expr {
    let n = Expr::value(agents.len() as i64);
    let matched = Expr::CountDistinct(Box::new(Expr::Case {
        branches: vec![(
            Expr::col(&X, &AG).in_list(agents.iter().map(|a| Expr::value(a.as_str())).collect(), false),
            Expr::col(&X, &AG),
        )],
        otherwise: None,
    }));
    if base_agent {
        // the regimen contains every requested agent
        matched.equals(n)
    } else {
        // the regimen consists of exactly the requested agents
        Expr::And(vec![Expr::CountAll.equals(n.clone()), matched.equals(n)])
    }
}

fn treatment_select(parent: &Cohort, source: &EntitySource, spec: &TreatmentSpec) -> Result<Select> {
    let id = source.score_id_column()?;
    let regimen_filter = |regimen: i64| Expr::col(&X, &RN).equals(Expr::value(regimen));

    let mut branches: Vec<Query> = Vec::new();
    if !spec.agent_sets.is_empty() {
        let mut agents = treated_ids(source, &id)
            .group_by(Expr::col(&X, &id))
            .group_by(Expr::col(&X, &RN))
            .having(Expr::any(
                spec.agent_sets
                    .iter()
                    .map(|set| agent_set_matches(set, spec.base_agent))
                    .collect(),
            ));
        if let Some(regimen) = spec.regimen {
            agents = agents.filter(regimen_filter(regimen));
        }
        branches.push(agents.into());
    }

    if spec.null || spec.not_null {
        let with_regimen = treated_ids(source, &id).filter(regimen_filter(spec.null_regimen()));
        // `null` wins when both markers are present
        let null_branch = Select::new()
            .item_as(Expr::col(&BASE, &id), &id)
            .from(Source::table(source.table.clone(), Some(&BASE)))
            .join(
                JoinKind::LeftOuter,
                Source::subquery(with_regimen, &NNT),
                Some(Expr::col(&BASE, &id).equals(Expr::col(&NNT, &id))),
            )
            .filter(Expr::col(&NNT, &id).is_null(!spec.null));
        branches.push(null_branch.into());
    }

    if branches.is_empty() {
        if let Some(regimen) = spec.regimen {
            branches.push(treated_ids(source, &id).filter(regimen_filter(regimen)).into());
        }
    }

    Ok(Select::new()
        .all_from(&COHORT)
        .from(Source::subquery(stored(parent), &COHORT))
        .join(
            JoinKind::Inner,
            Source::subquery(Query::Union(branches), &REFINED),
            Some(Expr::col(&COHORT, &id).equals(Expr::col(&REFINED, &id))),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterKind;
    use crate::params::Params;
    use crate::predicate::VALUE_LIST_DELIMITER;
    use coral_common::db::SqlValue;

    fn composer() -> Composer {
        Composer::new(&CatalogConfig::default()).unwrap()
    }

    fn root_cohort(table: &str) -> Cohort {
        let schema = if table == "tdp_cellline" { "cellline" } else { "tissue" };
        let source = EntitySource::new("publicdb", schema, table).unwrap();
        let new = composer().root("root", true, -1, &source);
        Cohort {
            id: 1,
            name: new.name,
            is_initial: new.is_initial,
            previous_cohort: new.previous_cohort,
            entity_database: new.entity_database,
            entity_schema: new.entity_schema,
            entity_table: new.entity_table,
            statement: new.statement,
            parameters: new.parameters,
        }
    }

    fn child_of(parent: &Cohort, id: i64, new: NewCohort) -> Cohort {
        assert_eq!(new.previous_cohort, parent.id);
        Cohort {
            id,
            name: new.name,
            is_initial: new.is_initial,
            previous_cohort: new.previous_cohort,
            entity_database: new.entity_database,
            entity_schema: new.entity_schema,
            entity_table: new.entity_table,
            statement: new.statement,
            parameters: new.parameters,
        }
    }

    fn filter(kind: FilterKind, pairs: &[(&str, &str)]) -> FilterSpec {
        let params: Params = pairs.iter().copied().collect();
        FilterSpec::from_params(kind, &params).unwrap()
    }

    #[test]
    fn test_root_statement() {
        let root = root_cohort("tdp_tissue");
        assert_eq!(root.statement, r#"SELECT * FROM "tissue"."tdp_tissue""#);
        assert!(root.parameters.is_empty());
        assert_eq!(root.is_initial, 1);
    }

    #[test]
    fn test_equals_wraps_parent() {
        let root = root_cohort("tdp_tissue");
        let spec = filter(
            FilterKind::Equals,
            &[("attribute", "gender"), ("numeric", "false"), ("values", "female")],
        );
        let child = composer().derive(&root, "women", &spec).unwrap();
        assert_eq!(
            child.statement,
            r#"SELECT "p".* FROM (SELECT * FROM "tissue"."tdp_tissue") "p" WHERE ("p"."gender" IN (?))"#
        );
        assert_eq!(child.parameters, vec![SqlValue::from("female")]);
        assert_eq!(child.is_initial, 0);
        assert_eq!(child.previous_cohort, 1);
        assert_eq!(child.entity_table, "tdp_tissue");
    }

    #[test]
    fn test_nesting_keeps_parameter_order() {
        let root = root_cohort("tdp_tissue");
        let c1 = child_of(
            &root,
            2,
            composer()
                .derive(
                    &root,
                    "c1",
                    &filter(
                        FilterKind::Equals,
                        &[("attribute", "gender"), ("numeric", "false"), ("values", "female")],
                    ),
                )
                .unwrap(),
        );
        let c2 = composer()
            .derive(
                &c1,
                "c2",
                &filter(FilterKind::NumericRange, &[("attribute", "age"), ("ranges", "gte_40")]),
            )
            .unwrap();

        assert!(c2.statement.starts_with(r#"SELECT "p".* FROM (SELECT "p".* FROM (SELECT * FROM"#));
        assert_eq!(c2.parameters, vec![SqlValue::from("female"), SqlValue::Integer(40)]);
        assert_eq!(
            SqlFragment::new(c2.statement.clone(), c2.parameters.clone()).placeholder_count(),
            2
        );
    }

    #[test]
    fn test_gene_score_joins_catalog() {
        let root = root_cohort("tdp_tissue");
        let spec = filter(
            FilterKind::GeneRange,
            &[
                ("table", "expression"),
                ("attribute", "tpm"),
                ("ensg", "ENSG00000141510"),
                ("ranges", "gt_10"),
            ],
        );
        let child = composer().derive(&root, "high", &spec).unwrap();
        assert!(child.statement.contains(r#"LEFT OUTER JOIN (SELECT "attr"."tissuename" AS "tissuename", "attr"."tpm" AS "score" FROM "tissue"."tdp_expression" "attr" INNER JOIN "public"."tdp_gene" "gene""#));
        assert!(child.statement.ends_with(r#"WHERE ("cohort_score"."score" > ?)"#));
        assert_eq!(
            child.parameters,
            vec![
                SqlValue::from("human"),
                SqlValue::from("ENSG00000141510"),
                SqlValue::Integer(10)
            ]
        );
    }

    #[test]
    fn test_depletion_adds_screen() {
        let root = root_cohort("tdp_cellline");
        let spec = filter(
            FilterKind::DepletionRange,
            &[
                ("table", "depletionscore"),
                ("attribute", "rsa"),
                ("ensg", "ENSG00000141510"),
                ("depletionscreen", "Drive"),
                ("ranges", "lt_-1"),
            ],
        );
        let child = composer().derive(&root, "dep", &spec).unwrap();
        assert!(child.statement.contains(r#"("attr"."depletionscreen" = ?)"#));
        assert!(child.statement.contains(r#""cellline"."tdp_depletionscore""#));
        assert_eq!(child.parameters[2], SqlValue::from("Drive"));
        assert_eq!(child.parameters[3], SqlValue::Integer(-1));
    }

    #[test]
    fn test_score_filters_need_score_capable_tables() {
        let mut root = root_cohort("tdp_tissue");
        root.entity_table = "korea".to_string();
        let spec = filter(
            FilterKind::GeneRange,
            &[("table", "expression"), ("attribute", "tpm"), ("ensg", "E"), ("ranges", "gt_1")],
        );
        let err = composer().derive(&root, "x", &spec).unwrap_err();
        assert!(matches!(err, coral_common::Error::UnsupportedEntityTable(_)));
    }

    #[test]
    fn test_panel_defaults_to_false() {
        let root = root_cohort("tdp_tissue");
        let spec = filter(FilterKind::Panel, &[("panel", "TCGA normals"), ("values", "false")]);
        let child = composer().derive(&root, "non-members", &spec).unwrap();
        assert!(child.statement.ends_with(r#"WHERE (COALESCE("d"."score", ?) IN (?))"#));
        assert_eq!(
            child.parameters,
            vec![
                SqlValue::Bool(true),
                SqlValue::from("TCGA normals"),
                SqlValue::Bool(false),
                SqlValue::Bool(false)
            ]
        );
    }

    #[test]
    fn test_treatment_branches_are_unioned() {
        let root = root_cohort("tdp_tissue");
        let agent = ["Cisplatin", "null"].join(VALUE_LIST_DELIMITER);
        let spec = filter(FilterKind::Treatment, &[("agent", agent.as_str()), ("baseAgent", "true")]);
        let child = composer().derive(&root, "t", &spec).unwrap();
        assert!(child.statement.contains(" UNION "));
        assert!(child.statement.contains("json_each(\"t\".\"treatment\")"));
        assert!(child.statement.contains(r#"INNER JOIN (SELECT DISTINCT"#));
        // containment only compares the distinct matched count
        assert!(!child.statement.contains("(COUNT(*) = ?)"));
    }

    #[test]
    fn test_membership_targets_root_table() {
        let root = root_cohort("tdp_tissue");
        let spec = FilterSpec::Membership {
            entity_ids: vec!["T1".into(), "T2".into()],
        };
        let child = composer().derive(&root, "cluster 0", &spec).unwrap();
        assert_eq!(
            child.statement,
            r#"SELECT "p".* FROM (SELECT * FROM "tissue"."tdp_tissue") "p" WHERE ("p"."tissuename" IN (SELECT "e"."value" FROM json_each(?) "e"))"#
        );
        assert_eq!(child.parameters, vec![SqlValue::from(r#"["T1","T2"]"#)]);
        assert_eq!(child.members, vec!["T1".to_string(), "T2".to_string()]);
    }

    #[test]
    fn test_data_query_projects_attribute() {
        let root = root_cohort("tdp_tissue");
        let stmt = SqlFragment::new(root.statement.clone(), root.parameters.clone());
        let sql = composer()
            .data_query(&root, stmt, Some(&Ident::fixed("age")))
            .unwrap()
            .sql;
        assert_eq!(
            sql,
            r#"SELECT "p"."tissuename" AS "tissuename", "p"."age" AS "age" FROM (SELECT * FROM "tissue"."tdp_tissue") "p""#
        );
    }
}
