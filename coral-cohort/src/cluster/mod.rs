//! Cluster-split advisor
//!
//! Finds natural sub-populations of a cohort over one or two attributes. The attribute
//! types resolve once to a [`ClusterShape`], which picks the [`ClusterStrategy`].

pub mod boundaries;
pub mod hdbscan;
pub mod kmeans;
pub mod kprototypes;

pub use boundaries::{boundaries, boundaries_1d};
pub use hdbscan::Hdbscan;
pub use kmeans::KMeans;
pub use kprototypes::{KModes, KPrototypes};

use coral_common::config::ClusterConfig;
use coral_common::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Label of points not assigned to any cluster
pub const NOISE: i64 = -1;

/// Declared type of a clustering attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Number,
    Categorical,
}

/// One attribute of a `createAutomatically` request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttributeSpec {
    #[serde(rename = "dataKey")]
    pub data_key: String,
    #[serde(rename = "type")]
    pub kind: AttributeKind,
}

impl AttributeSpec {
    /// Parse the JSON array `[{"dataKey": "age", "type": "number"}, ...]`
    pub fn parse_list(json: &str) -> Result<Vec<Self>> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidFilterValue(format!("attributes: {}", e)))
    }
}

/// Attribute-type combination of a clustering request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterShape {
    Numeric1D,
    Numeric2D,
    Mixed,
    Categorical2D,
}

impl ClusterShape {
    pub fn resolve(attributes: &[AttributeSpec]) -> Result<Self> {
        use AttributeKind::{Categorical, Number};
        match attributes.iter().map(|a| a.kind).collect::<Vec<_>>().as_slice() {
            [Number] => Ok(ClusterShape::Numeric1D),
            [Number, Number] => Ok(ClusterShape::Numeric2D),
            [Number, Categorical] | [Categorical, Number] => Ok(ClusterShape::Mixed),
            [Categorical, Categorical] => Ok(ClusterShape::Categorical2D),
            [Categorical] => Err(Error::UnsupportedClusteringCombination(
                "a single categorical attribute".to_string(),
            )),
            other => Err(Error::InvalidFilterValue(format!(
                "clustering takes one or two attributes, got {}",
                other.len()
            ))),
        }
    }
}

/// One entity with its clustering attributes split by type
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: String,
    pub numeric: Vec<f64>,
    pub categorical: Vec<String>,
}

/// Per-point cluster labels, [`NOISE`] for unassigned points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clustering {
    pub labels: Vec<i64>,
}

impl Clustering {
    pub fn from_labels(labels: Vec<i64>) -> Self {
        Self { labels }
    }

    /// Distinct labels in ascending order (noise first when present)
    pub fn cluster_labels(&self) -> Vec<i64> {
        self.labels
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Ids of the observations carrying `label`
    pub fn members<'a>(&self, data: &'a [Observation], label: i64) -> Vec<&'a str> {
        data.iter()
            .zip(&self.labels)
            .filter(|(_, &l)| l == label)
            .map(|(o, _)| o.id.as_str())
            .collect()
    }
}

/// A clustering algorithm
pub trait ClusterStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn fit(&self, data: &[Observation]) -> Result<Clustering>;
}

pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Strategy selection and cluster-count search
#[derive(Debug, Clone)]
pub struct ClusterAdvisor {
    config: ClusterConfig,
}

impl ClusterAdvisor {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    /// Reject populations too large to cluster or too small to split
    pub fn check_population(&self, n: usize) -> Result<()> {
        if n > self.config.max_points {
            return Err(Error::Clustering(format!(
                "{} rows exceed the clustering limit of {}",
                n, self.config.max_points
            )));
        }
        if n < 2 {
            return Err(Error::Clustering(format!(
                "at least 2 rows with values are needed, got {}",
                n
            )));
        }
        Ok(())
    }

    /// Pick the algorithm for a shape; `requested` of 0 leaves the count to the algorithm
    pub fn strategy(&self, shape: ClusterShape, requested: usize) -> Box<dyn ClusterStrategy> {
        let seed = self.config.seed;
        match shape {
            ClusterShape::Numeric1D | ClusterShape::Numeric2D if requested > 0 => {
                Box::new(KMeans { k: requested, seed })
            }
            ClusterShape::Numeric1D | ClusterShape::Numeric2D => Box::new(Hdbscan {
                min_cluster_fraction: self.config.min_cluster_fraction,
            }),
            ClusterShape::Mixed => Box::new(KPrototypes {
                k: if requested > 0 {
                    requested
                } else {
                    kprototypes::DEFAULT_PROTOTYPES
                },
                seed,
            }),
            ClusterShape::Categorical2D => Box::new(KModes),
        }
    }

    /// k-means cluster count: the requested one, or the elbow of the inertia curve
    pub fn choose_k(&self, points: &[Vec<f64>], requested: usize) -> Result<usize> {
        let distinct = distinct_points(points);
        if requested > 0 {
            if requested > distinct {
                return Err(Error::Clustering(format!(
                    "{} clusters requested but only {} distinct values",
                    requested, distinct
                )));
            }
            return Ok(requested);
        }
        if distinct < 2 {
            return Err(Error::Clustering(
                "all rows share the same value; nothing to split".to_string(),
            ));
        }

        let upper = self.config.max_k.min(distinct + 1);
        let ks: Vec<usize> = (2..upper.max(3)).collect();
        let inertia = ks
            .iter()
            .map(|&k| kmeans::fit(points, k, self.config.seed).map(|f| f.inertia))
            .collect::<Result<Vec<f64>>>()?;
        debug!(?inertia, "Inertia per cluster count");

        let k = ks[elbow(&inertia, self.config.elbow_threshold)];
        debug!(k, "Chosen number of clusters");
        Ok(k)
    }

    /// Final k-means labels for a chosen cluster count
    pub fn fit_kmeans(&self, points: &[Vec<f64>], k: usize) -> Result<Vec<i64>> {
        let fit = kmeans::fit(points, k, self.config.seed)?;
        Ok(fit.labels.into_iter().map(|l| l as i64).collect())
    }
}

/// Index of the elbow in an inertia curve, or the last index when there is none
///
/// The elbow is the first `i` where the next inertia decrease is less than `threshold`
/// times the current one.
pub fn elbow(inertia: &[f64], threshold: f64) -> usize {
    let diffs: Vec<f64> = inertia.windows(2).map(|w| w[1] - w[0]).collect();
    for i in 0..diffs.len().saturating_sub(1) {
        if diffs[i] == 0.0 {
            continue;
        }
        let ratio = diffs[i + 1] / diffs[i];
        debug!(i, ratio, "Inertia change ratio");
        if ratio < threshold {
            return i;
        }
    }
    inertia.len().saturating_sub(1)
}

fn distinct_points(points: &[Vec<f64>]) -> usize {
    points
        .iter()
        .map(|p| p.iter().map(|v| v.to_bits()).collect::<Vec<u64>>())
        .collect::<BTreeSet<_>>()
        .len()
}
