//! Cohort operations
//!
//! [`CohortService`] is the single entry point of the core. Every operation takes the flat
//! request parameters, validates all of them before any SQL is issued, and then reads the
//! registry and the entity database of the cohort's lineage.

use crate::cluster::{
    boundaries, AttributeKind, AttributeSpec, ClusterAdvisor, ClusterShape, Observation, NOISE,
};
use crate::composer::{stored, AttributeType, Composer};
use crate::entity::EntitySource;
use crate::executor::{fetch_count, fetch_json, fetch_rows, JsonRow};
use crate::filter::{FilterKind, FilterSpec, ScoreSource};
use crate::histogram::{
    format_categories, format_numeric, Histogram, HistogramKind, HistogramQuery, HistogramRequest,
    RawBin,
};
use crate::params::Params;
use crate::repository::CohortRepository;
use crate::sql::{Ident, SqlFragment};
use coral_common::config::{ClusterConfig, HistogramConfig, TomlConfig};
use coral_common::db::{
    init_registry, Cohort, CohortSummary, DatabasePools, EntityStore, TimedPool, NO_PARENT,
};
use coral_common::{Error, Result};
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Split boundaries per attribute name
pub type SplitRecommendation = BTreeMap<String, Vec<f64>>;

pub struct CohortService {
    registry: CohortRepository,
    store: EntityStore,
    composer: Composer,
    histogram: HistogramConfig,
    advisor: ClusterAdvisor,
}

impl CohortService {
    pub fn new(
        registry: CohortRepository,
        store: EntityStore,
        composer: Composer,
        histogram: HistogramConfig,
        cluster: ClusterConfig,
    ) -> Self {
        Self {
            registry,
            store,
            composer,
            histogram,
            advisor: ClusterAdvisor::new(cluster),
        }
    }

    /// Open the registry and every configured entity database
    pub async fn connect(config: &TomlConfig) -> Result<Self> {
        let registry = DatabasePools::connect(&config.registry, &config.pool).await?;
        init_registry(registry.primary.pool()).await?;
        let store = EntityStore::connect(&config.databases, &config.pool).await?;
        info!("Entity databases: {:?}", store.names());

        Ok(Self::new(
            CohortRepository::new(registry.primary),
            store,
            Composer::new(&config.catalog)?,
            config.histogram.clone(),
            config.cluster.clone(),
        ))
    }

    pub fn registry(&self) -> &CohortRepository {
        &self.registry
    }

    pub async fn close(&self) {
        self.registry.pool().pool().close().await;
        self.store.close().await;
    }

    fn pool(&self, cohort: &Cohort, supplemental: bool) -> Result<&TimedPool> {
        Ok(self.store.database(&cohort.entity_database)?.select(supplemental))
    }

    /// `createRoot`: a cohort over a whole entity table
    pub async fn create_root(&self, params: &Params) -> Result<Cohort> {
        let name = params.required("name")?;
        let is_initial = match params.int("isInitial")? {
            0 => false,
            1 => true,
            other => {
                return Err(Error::InvalidFilterValue(format!(
                    "isInitial must be 0 or 1, got {}",
                    other
                )))
            }
        };
        let previous = params.int("previous")?;
        let source = EntitySource::new(
            params.required("database")?,
            params.required("schema")?,
            params.required("table")?,
        )?;

        self.store.database(&source.database)?;
        if previous != NO_PARENT && !self.registry.exists(previous).await? {
            return Err(Error::NotFound(format!("cohort {}", previous)));
        }

        let cohort = self.composer.root(name, is_initial, previous, &source);
        let id = self.registry.insert(&cohort).await?;
        self.registry.get(id).await
    }

    /// `deriveAndStore`: persist the child of `cohortId` selected by a named filter
    pub async fn derive(&self, kind: FilterKind, params: &Params) -> Result<i64> {
        let parent_id = params.int("cohortId")?;
        let name = params.required("name")?;
        let filter = FilterSpec::from_params(kind, params)?;

        let parent = self.registry.get(parent_id).await?;
        let cohort = self.composer.derive(&parent, name, &filter)?;
        debug!(filter = %kind, parent = parent.id, "Deriving cohort");
        self.registry.insert(&cohort).await
    }

    async fn preview_statement(
        &self,
        kind: FilterKind,
        params: &Params,
    ) -> Result<(Cohort, SqlFragment)> {
        let parent_id = params.int("cohortId")?;
        let filter = FilterSpec::from_params(kind, params)?;
        let parent = self.registry.get(parent_id).await?;
        let statement = self.composer.filter_statement(&parent, &filter)?;
        Ok((parent, statement))
    }

    /// Rows a filter would select, without storing a cohort
    pub async fn preview_data(&self, kind: FilterKind, params: &Params) -> Result<Vec<JsonRow>> {
        let (parent, statement) = self.preview_statement(kind, params).await?;
        fetch_json(self.pool(&parent, false)?, &statement).await
    }

    /// Row count a filter would select, without storing a cohort
    pub async fn preview_size(&self, kind: FilterKind, params: &Params) -> Result<i64> {
        let (parent, statement) = self.preview_statement(kind, params).await?;
        let count = self.composer.size_query(statement);
        fetch_count(self.pool(&parent, false)?, &count).await
    }

    /// `listByIds`: summaries for the `cohortIds` list
    pub async fn list_by_ids(&self, params: &Params) -> Result<Vec<CohortSummary>> {
        self.registry.list_by_ids(params.required("cohortIds")?).await
    }

    pub async fn rename(&self, params: &Params) -> Result<Cohort> {
        let id = params.int("cohortId")?;
        let name = params.required("name")?;
        self.registry.rename(id, name).await
    }

    /// All rows of a cohort, or its entity ids with one attribute
    pub async fn data(&self, params: &Params) -> Result<Vec<JsonRow>> {
        let id = params.int("cohortId")?;
        let attribute = params.optional("attribute").map(Ident::new).transpose()?;
        let cohort = self.registry.get(id).await?;
        let statement = stored(&cohort).render();
        let query = self
            .composer
            .data_query(&cohort, statement, attribute.as_ref())?;
        fetch_json(self.pool(&cohort, false)?, &query).await
    }

    pub async fn size(&self, params: &Params) -> Result<i64> {
        let id = params.int("cohortId")?;
        let cohort = self.registry.get(id).await?;
        let query = self.composer.size_query(stored(&cohort).render());
        fetch_count(self.pool(&cohort, false)?, &query).await
    }

    async fn scores(&self, params: &Params, score: ScoreSource) -> Result<Vec<JsonRow>> {
        let id = params.int("cohortId")?;
        let cohort = self.registry.get(id).await?;
        let query = self.composer.score_query(&cohort, &score)?;
        fetch_json(self.pool(&cohort, false)?, &query).await
    }

    /// `(entity id, score)` of one gene for every cohort member
    pub async fn gene_score(&self, params: &Params) -> Result<Vec<JsonRow>> {
        let score = ScoreSource::gene(params)?;
        self.scores(params, score).await
    }

    /// `(entity id, score)` of one gene in one depletion screen
    pub async fn depletion_score(&self, params: &Params) -> Result<Vec<JsonRow>> {
        let score = ScoreSource::depletion(params)?;
        self.scores(params, score).await
    }

    /// `(entity id, score)` where score tells whether the entity is in `panel`
    pub async fn panel_annotation(&self, params: &Params) -> Result<Vec<JsonRow>> {
        let id = params.int("cohortId")?;
        let panel = params.required("panel")?;
        let cohort = self.registry.get(id).await?;
        let query = self.composer.panel_query(&cohort, panel)?;
        fetch_json(self.pool(&cohort, false)?, &query).await
    }

    /// `histogram`: run on the supplemental pool of the cohort's database
    pub async fn histogram(&self, params: &Params) -> Result<Histogram> {
        let kind = HistogramKind::parse(params.required("type")?)?;
        let request = HistogramRequest::from_params(kind, params)?;
        let id = params.int("cohortId")?;
        let cohort = self.registry.get(id).await?;

        let bins = self.histogram.bins;
        let statement = HistogramQuery::new(&self.composer, &cohort)?.build(&request, bins)?;
        let rows = fetch_rows(self.pool(&cohort, true)?, &statement).await?;

        if request.is_numeric() {
            let raw = rows
                .iter()
                .map(|row| {
                    Ok(RawBin {
                        bin: row.try_get("bin")?,
                        min: row.try_get("min")?,
                        max: row.try_get("max")?,
                        count: row.try_get("count")?,
                    })
                })
                .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;
            Ok(Histogram::Numeric(format_numeric(&raw, bins)))
        } else {
            let raw = rows
                .iter()
                .map(|row| Ok((row.try_get("bin")?, row.try_get("count")?)))
                .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;
            Ok(Histogram::Categorical(format_categories(raw)))
        }
    }

    /// Cohort members with every requested attribute set
    async fn observations(&self, cohort: &Cohort, specs: &[AttributeSpec]) -> Result<Vec<Observation>> {
        let attributes = specs
            .iter()
            .map(|spec| {
                let ty = match spec.kind {
                    AttributeKind::Number => AttributeType::Number,
                    AttributeKind::Categorical => AttributeType::Categorical,
                };
                Ok((Ident::new(&spec.data_key)?, ty))
            })
            .collect::<Result<Vec<_>>>()?;
        let query = self.composer.attributes_query(cohort, &attributes)?;
        let rows = fetch_rows(self.pool(cohort, false)?, &query).await?;

        let mut data = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut observation = Observation {
                id: row.try_get(0)?,
                numeric: Vec::new(),
                categorical: Vec::new(),
            };
            for (i, spec) in specs.iter().enumerate() {
                match spec.kind {
                    AttributeKind::Number => observation.numeric.push(row.try_get(i + 1)?),
                    AttributeKind::Categorical => observation.categorical.push(row.try_get(i + 1)?),
                }
            }
            data.push(observation);
        }
        debug!(cohort = cohort.id, rows = data.len(), "Loaded clustering input");
        Ok(data)
    }

    /// `splitRecommend`: k-means split boundaries over one or two numeric attributes
    pub async fn recommend_split(&self, params: &Params) -> Result<SplitRecommendation> {
        let id = params.int("cohortId")?;
        let mut specs = vec![numeric_spec(params.ident("attribute0")?)];
        if let Some(second) = params.optional("attribute1") {
            specs.push(numeric_spec(Ident::new(second)?));
        }
        let requested = cluster_count(params)?;

        let cohort = self.registry.get(id).await?;
        let data = self.observations(&cohort, &specs).await?;
        self.advisor.check_population(data.len())?;

        let advisor = self.advisor.clone();
        let (points, labels) = tokio::task::spawn_blocking(move || -> Result<_> {
            let points: Vec<Vec<f64>> = data.into_iter().map(|o| o.numeric).collect();
            let k = advisor.choose_k(&points, requested)?;
            let labels = advisor.fit_kmeans(&points, k)?;
            Ok((points, labels))
        })
        .await??;

        let split: SplitRecommendation = specs
            .into_iter()
            .map(|spec| spec.data_key)
            .zip(boundaries(&points, &labels))
            .collect();
        info!(cohort = id, ?split, "Recommended split");
        Ok(split)
    }

    /// `createAutomatic`: one child cohort per cluster, noise collected in its own cohort
    pub async fn create_automatically(&self, params: &Params) -> Result<Vec<i64>> {
        let id = params.int("cohortId")?;
        let specs = AttributeSpec::parse_list(params.required("attributes")?)?;
        let shape = ClusterShape::resolve(&specs)?;
        for spec in &specs {
            Ident::new(&spec.data_key)?;
        }
        let requested = cluster_count(params)?;

        let parent = self.registry.get(id).await?;
        let base_name = params.optional("name").unwrap_or(&parent.name).to_string();
        let data = self.observations(&parent, &specs).await?;
        self.advisor.check_population(data.len())?;

        let strategy = self.advisor.strategy(shape, requested);
        info!(
            cohort = id,
            method = strategy.name(),
            rows = data.len(),
            "Clustering cohort"
        );
        let (data, clustering) = tokio::task::spawn_blocking(move || {
            strategy.fit(&data).map(|clustering| (data, clustering))
        })
        .await??;

        let mut children = Vec::new();
        for label in clustering.cluster_labels() {
            let entity_ids: Vec<String> = clustering
                .members(&data, label)
                .into_iter()
                .map(str::to_string)
                .collect();
            let name = if label == NOISE {
                format!("{} unclustered", base_name)
            } else {
                format!("{} cluster {}", base_name, label + 1)
            };
            children.push(
                self.composer
                    .derive(&parent, &name, &FilterSpec::Membership { entity_ids })?,
            );
        }
        self.registry.insert_all(&children).await
    }
}

fn numeric_spec(attribute: Ident) -> AttributeSpec {
    AttributeSpec {
        data_key: attribute.as_str().to_string(),
        kind: AttributeKind::Number,
    }
}

/// `numberOfClusters`, 0 meaning "choose automatically"
fn cluster_count(params: &Params) -> Result<usize> {
    let requested = params.optional_int("numberOfClusters")?.unwrap_or(0);
    usize::try_from(requested).map_err(|_| {
        Error::InvalidFilterValue(format!(
            "numberOfClusters must not be negative, got {}",
            requested
        ))
    })
}
