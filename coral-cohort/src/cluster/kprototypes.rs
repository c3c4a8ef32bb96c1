//! Mixed-type clustering (k-prototypes) and the categorical-only placeholder

use super::{squared_distance, ClusterStrategy, Clustering, Observation};
use coral_common::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use std::collections::HashMap;

const MAX_ITERATIONS: usize = 100;

/// Cluster count used when none is requested
pub const DEFAULT_PROTOTYPES: usize = 2;

/// k-prototypes: squared Euclidean distance on numeric attributes plus `gamma` times the
/// number of mismatching categorical attributes
#[derive(Debug, Clone)]
pub struct KPrototypes {
    pub k: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
struct Prototype {
    numeric: Vec<f64>,
    categorical: Vec<String>,
}

impl KPrototypes {
    fn cost(gamma: f64, point: &Observation, proto: &Prototype) -> f64 {
        let mismatches = point
            .categorical
            .iter()
            .zip(&proto.categorical)
            .filter(|(a, b)| a != b)
            .count();
        squared_distance(&point.numeric, &proto.numeric) + gamma * mismatches as f64
    }

    fn nearest(gamma: f64, point: &Observation, prototypes: &[Prototype]) -> usize {
        let mut best = 0;
        let mut best_cost = f64::INFINITY;
        for (j, proto) in prototypes.iter().enumerate() {
            let cost = Self::cost(gamma, point, proto);
            if cost < best_cost {
                best_cost = cost;
                best = j;
            }
        }
        best
    }
}

/// Half the mean standard deviation of the numeric attributes
fn default_gamma(data: &[Observation]) -> f64 {
    let dims = data[0].numeric.len();
    if dims == 0 {
        return 1.0;
    }
    let n = data.len() as f64;
    let total: f64 = (0..dims)
        .map(|j| {
            let mean = data.iter().map(|o| o.numeric[j]).sum::<f64>() / n;
            let var = data.iter().map(|o| (o.numeric[j] - mean).powi(2)).sum::<f64>() / n;
            var.sqrt()
        })
        .sum();
    0.5 * total / dims as f64
}

fn update(data: &[Observation], labels: &[usize], k: usize, previous: &[Prototype]) -> Vec<Prototype> {
    (0..k)
        .map(|c| {
            let members: Vec<&Observation> = data
                .iter()
                .zip(labels)
                .filter(|(_, &l)| l == c)
                .map(|(o, _)| o)
                .collect();
            if members.is_empty() {
                return previous[c].clone();
            }
            let count = members.len() as f64;
            let numeric = (0..previous[c].numeric.len())
                .map(|j| members.iter().map(|o| o.numeric[j]).sum::<f64>() / count)
                .collect();
            let categorical = (0..previous[c].categorical.len())
                .map(|j| {
                    let mut counts: HashMap<&str, usize> = HashMap::new();
                    for o in &members {
                        *counts.entry(o.categorical[j].as_str()).or_default() += 1;
                    }
                    // most frequent value, ties broken alphabetically
                    counts
                        .into_iter()
                        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
                        .map(|(v, _)| v.to_string())
                        .unwrap_or_default()
                })
                .collect();
            Prototype { numeric, categorical }
        })
        .collect()
}

impl ClusterStrategy for KPrototypes {
    fn name(&self) -> &'static str {
        "k-prototypes"
    }

    fn fit(&self, data: &[Observation]) -> Result<Clustering> {
        if self.k == 0 || self.k > data.len() {
            return Err(Error::Clustering(format!(
                "cannot form {} clusters from {} rows",
                self.k,
                data.len()
            )));
        }
        let gamma = default_gamma(data);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut prototypes: Vec<Prototype> = sample(&mut rng, data.len(), self.k)
            .into_iter()
            .map(|i| Prototype {
                numeric: data[i].numeric.clone(),
                categorical: data[i].categorical.clone(),
            })
            .collect();

        let mut labels = vec![usize::MAX; data.len()];
        for _ in 0..MAX_ITERATIONS {
            let mut changed = false;
            for (i, point) in data.iter().enumerate() {
                let best = Self::nearest(gamma, point, &prototypes);
                if labels[i] != best {
                    labels[i] = best;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            prototypes = update(data, &labels, self.k, &prototypes);
        }

        Ok(Clustering::from_labels(
            labels.into_iter().map(|l| l as i64).collect(),
        ))
    }
}

/// Categorical-only clustering has no implementation
#[derive(Debug, Clone, Default)]
pub struct KModes;

impl ClusterStrategy for KModes {
    fn name(&self) -> &'static str {
        "k-modes"
    }

    fn fit(&self, _data: &[Observation]) -> Result<Clustering> {
        Err(Error::UnsupportedClusteringCombination(
            "clustering two categorical attributes is not implemented".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(id: &str, value: f64, category: &str) -> Observation {
        Observation {
            id: id.to_string(),
            numeric: vec![value],
            categorical: vec![category.to_string()],
        }
    }

    #[test]
    fn test_mixed_groups() {
        let data = vec![
            obs("a", 1.0, "female"),
            obs("b", 1.5, "female"),
            obs("c", 2.0, "female"),
            obs("d", 40.0, "male"),
            obs("e", 41.0, "male"),
            obs("f", 42.0, "male"),
        ];
        let clustering = KPrototypes { k: 2, seed: 3 }.fit(&data).unwrap();
        let labels = &clustering.labels;
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[3], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_categorical_pairs_are_unsupported() {
        let err = KModes.fit(&[obs("a", 0.0, "x")]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedClusteringCombination(_)));
    }

    #[test]
    fn test_gamma_scales_with_spread() {
        let narrow = default_gamma(&[obs("a", 0.0, "x"), obs("b", 2.0, "x")]);
        let wide = default_gamma(&[obs("a", 0.0, "x"), obs("b", 20.0, "x")]);
        assert_eq!(narrow, 0.5);
        assert_eq!(wide, 5.0);
    }
}
