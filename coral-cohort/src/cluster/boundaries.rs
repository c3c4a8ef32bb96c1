//! Split boundaries between clusters
//!
//! For one numeric attribute, clusters are ordered by their minimum and each boundary is
//! the midpoint between the maximum of a cluster and the minimum of the next. With two
//! attributes the same computation is repeated independently per attribute; this does not
//! describe a true two-dimensional decision surface.

use super::NOISE;
use std::collections::BTreeMap;

/// Boundaries of one attribute (`values[i]` belongs to `labels[i]`); noise is ignored
pub fn boundaries_1d(values: &[f64], labels: &[i64]) -> Vec<f64> {
    let mut ranges: BTreeMap<i64, (f64, f64)> = BTreeMap::new();
    for (&value, &label) in values.iter().zip(labels) {
        if label == NOISE {
            continue;
        }
        ranges
            .entry(label)
            .and_modify(|(lo, hi)| {
                *lo = lo.min(value);
                *hi = hi.max(value);
            })
            .or_insert((value, value));
    }

    let mut ranges: Vec<(f64, f64)> = ranges.into_values().collect();
    ranges.sort_by(|a, b| a.0.total_cmp(&b.0));
    ranges
        .windows(2)
        .map(|pair| (pair[0].1 + pair[1].0) / 2.0)
        .collect()
}

/// Boundaries for every attribute column of `points`
pub fn boundaries(points: &[Vec<f64>], labels: &[i64]) -> Vec<Vec<f64>> {
    let dims = points.first().map_or(0, Vec::len);
    (0..dims)
        .map(|j| {
            let column: Vec<f64> = points.iter().map(|p| p[j]).collect();
            boundaries_1d(&column, labels)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midpoint_between_clusters() {
        let values = [1.0, 2.0, 3.0, 8.0, 9.0, 10.0];
        let labels = [1, 1, 1, 0, 0, 0];
        assert_eq!(boundaries_1d(&values, &labels), vec![5.5]);
    }

    #[test]
    fn test_three_clusters_and_noise() {
        let values = [20.0, 1.0, 11.0, 2.0, 12.0, 21.0, 100.0];
        let labels = [2, 0, 1, 0, 1, 2, NOISE];
        assert_eq!(boundaries_1d(&values, &labels), vec![6.5, 16.5]);
    }

    #[test]
    fn test_per_attribute_boundaries() {
        let points = vec![vec![1.0, 50.0], vec![3.0, 40.0], vec![8.0, 10.0], vec![10.0, 20.0]];
        let labels = [0, 0, 1, 1];
        assert_eq!(boundaries(&points, &labels), vec![vec![5.5], vec![30.0]]);
    }
}
