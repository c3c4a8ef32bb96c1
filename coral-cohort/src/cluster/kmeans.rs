//! Centroid-based clustering (k-means with k-means++ seeding)

use super::{squared_distance, ClusterStrategy, Clustering, Observation};
use coral_common::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MAX_ITERATIONS: usize = 300;
const RESTARTS: usize = 4;

/// A fitted k-means model
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Sum of squared distances of each point to its centroid
    pub inertia: f64,
}

/// Fit k-means, keeping the best of several seeded restarts
pub fn fit(points: &[Vec<f64>], k: usize, seed: u64) -> Result<KMeansFit> {
    if k == 0 || k > points.len() {
        return Err(Error::Clustering(format!(
            "cannot form {} clusters from {} rows",
            k,
            points.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut best: Option<KMeansFit> = None;
    for _ in 0..RESTARTS {
        let centroids = plus_plus(points, k, &mut rng);
        let fit = lloyd(points, centroids);
        if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
            best = Some(fit);
        }
    }
    best.ok_or_else(|| Error::Clustering("k-means produced no result".to_string()))
}

/// k-means++ seeding: each next centroid drawn with probability proportional to D(x)^2
fn plus_plus(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = vec![points[rng.gen_range(0..points.len())].clone()];
    let mut nearest: Vec<f64> = points
        .iter()
        .map(|p| squared_distance(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = nearest.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen_range(0.0..total);
            nearest
                .iter()
                .position(|d| {
                    target -= d;
                    target < 0.0
                })
                .unwrap_or(points.len() - 1)
        } else {
            rng.gen_range(0..points.len())
        };
        let centroid = points[next].clone();
        for (d, p) in nearest.iter_mut().zip(points) {
            *d = d.min(squared_distance(p, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

fn lloyd(points: &[Vec<f64>], mut centroids: Vec<Vec<f64>>) -> KMeansFit {
    let k = centroids.len();
    let dims = points[0].len();
    let mut labels = vec![usize::MAX; points.len()];

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (i, point) in points.iter().enumerate() {
            let best = nearest_centroid(point, &centroids);
            if labels[i] != best {
                labels[i] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![vec![0.0; dims]; k];
        let mut counts = vec![0_usize; k];
        for (point, &label) in points.iter().zip(&labels) {
            counts[label] += 1;
            for (s, v) in sums[label].iter_mut().zip(point) {
                *s += v;
            }
        }
        for c in 0..k {
            // an emptied cluster keeps its previous centroid
            if counts[c] > 0 {
                centroids[c] = sums[c].iter().map(|s| s / counts[c] as f64).collect();
            }
        }
    }

    let inertia = points
        .iter()
        .zip(&labels)
        .map(|(p, &l)| squared_distance(p, &centroids[l]))
        .sum();
    KMeansFit {
        labels,
        centroids,
        inertia,
    }
}

fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (j, centroid) in centroids.iter().enumerate() {
        let dist = squared_distance(point, centroid);
        if dist < best_dist {
            best_dist = dist;
            best = j;
        }
    }
    best
}

/// k-means with a fixed cluster count over the numeric attributes
#[derive(Debug, Clone)]
pub struct KMeans {
    pub k: usize,
    pub seed: u64,
}

impl ClusterStrategy for KMeans {
    fn name(&self) -> &'static str {
        "k-means"
    }

    fn fit(&self, data: &[Observation]) -> Result<Clustering> {
        let points: Vec<Vec<f64>> = data.iter().map(|o| o.numeric.clone()).collect();
        let fit = fit(&points, self.k, self.seed)?;
        Ok(Clustering::from_labels(
            fit.labels.into_iter().map(|l| l as i64).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(values: &[f64]) -> Vec<Vec<f64>> {
        values.iter().map(|v| vec![*v]).collect()
    }

    #[test]
    fn test_two_separated_groups() {
        let points = line(&[1.0, 2.0, 3.0, 8.0, 9.0, 10.0]);
        let fit = fit(&points, 2, 7).unwrap();
        assert_eq!(fit.labels[0], fit.labels[1]);
        assert_eq!(fit.labels[1], fit.labels[2]);
        assert_eq!(fit.labels[3], fit.labels[5]);
        assert_ne!(fit.labels[0], fit.labels[3]);
        assert!((fit.inertia - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_inertia_decreases_with_k() {
        let points = line(&[1.0, 2.0, 4.0, 7.0, 11.0, 16.0, 22.0]);
        let two = fit(&points, 2, 1).unwrap().inertia;
        let four = fit(&points, 4, 1).unwrap().inertia;
        assert!(four < two);
        assert_eq!(fit(&points, 7, 1).unwrap().inertia, 0.0);
    }

    #[test]
    fn test_too_many_clusters() {
        let points = line(&[1.0, 2.0]);
        assert!(matches!(fit(&points, 3, 1), Err(Error::Clustering(_))));
    }

    #[test]
    fn test_same_seed_same_result() {
        let points = line(&[0.5, 1.5, 3.0, 3.2, 9.0, 9.5, 12.0]);
        assert_eq!(fit(&points, 3, 42).unwrap(), fit(&points, 3, 42).unwrap());
    }
}
