//! Density-based clustering (HDBSCAN)
//!
//! Mutual-reachability minimum spanning tree, single-linkage hierarchy, condensed tree
//! pruned by the minimum cluster size, and excess-of-mass cluster selection. Points not
//! captured by a selected cluster are labelled noise (`-1`). Runs in O(n^2) time and O(n)
//! extra memory.

use super::{squared_distance, ClusterStrategy, Clustering, Observation, NOISE};
use coral_common::{Error, Result};

/// Lambda used for zero-distance merges
const MAX_LAMBDA: f64 = 1e150;

#[derive(Debug, Clone)]
pub struct Hdbscan {
    /// Minimum cluster size as a fraction of the population
    pub min_cluster_fraction: f64,
}

impl Hdbscan {
    /// `max(2, round(n * fraction))`
    pub fn min_cluster_size(&self, n: usize) -> usize {
        ((n as f64 * self.min_cluster_fraction).round() as usize).max(2)
    }
}

impl ClusterStrategy for Hdbscan {
    fn name(&self) -> &'static str {
        "hdbscan"
    }

    fn fit(&self, data: &[Observation]) -> Result<Clustering> {
        let points: Vec<Vec<f64>> = data.iter().map(|o| o.numeric.clone()).collect();
        let min_size = self.min_cluster_size(points.len());
        if points.len() < min_size {
            return Err(Error::Clustering(format!(
                "{} rows are fewer than the minimum cluster size {}",
                points.len(),
                min_size
            )));
        }
        let labels = hdbscan(&points, min_size);
        if labels.iter().all(|&l| l == NOISE) {
            return Err(Error::Clustering(
                "no dense clusters found; request an explicit number of clusters".to_string(),
            ));
        }
        Ok(Clustering::from_labels(labels))
    }
}

#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

#[derive(Debug, Clone)]
struct CondensedCluster {
    parent: Option<usize>,
    birth: f64,
    stability: f64,
    children: Vec<usize>,
}

/// Cluster labels (`-1` for noise) with `min_size` as both the core-distance neighbour
/// count and the minimum cluster size
pub fn hdbscan(points: &[Vec<f64>], min_size: usize) -> Vec<i64> {
    let n = points.len();
    if n < 2 {
        return vec![NOISE; n];
    }
    let core = core_distances(points, min_size);
    let mst = spanning_tree(points, &core);
    let merges = single_linkage(n, mst);
    let (clusters, exits) = condense(n, &merges, min_size);
    let selected = select_clusters(&clusters);
    label_points(&clusters, &exits, &selected)
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    squared_distance(a, b).sqrt()
}

/// Distance to the `min_size`-th nearest neighbour, the point itself counting as first
fn core_distances(points: &[Vec<f64>], min_size: usize) -> Vec<f64> {
    let rank = (min_size - 1).min(points.len() - 1);
    let mut row = vec![0.0; points.len()];
    points
        .iter()
        .map(|p| {
            for (d, q) in row.iter_mut().zip(points) {
                *d = distance(p, q);
            }
            let (_, kth, _) = row.select_nth_unstable_by(rank, f64::total_cmp);
            *kth
        })
        .collect()
}

/// Prim's algorithm over the dense mutual-reachability graph
fn spanning_tree(points: &[Vec<f64>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = points.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0_usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        let mut next = usize::MAX;
        let mut next_dist = f64::INFINITY;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let reach = distance(&points[current], &points[j])
                .max(core[current])
                .max(core[j]);
            if reach < best[j] {
                best[j] = reach;
                from[j] = current;
            }
            if best[j] < next_dist || next == usize::MAX {
                next_dist = best[j];
                next = j;
            }
        }
        in_tree[next] = true;
        edges.push((from[next], next, best[next]));
        current = next;
    }
    edges
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// Dendrogram nodes `n..2n-1`, merged in order of increasing distance
fn single_linkage(n: usize, mut edges: Vec<(usize, usize, f64)>) -> Vec<Merge> {
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));
    let mut parent: Vec<usize> = (0..2 * n - 1).collect();
    let mut size = vec![1_usize; 2 * n - 1];
    let mut merges = Vec::with_capacity(n - 1);

    for (a, b, distance) in edges {
        let left = find(&mut parent, a);
        let right = find(&mut parent, b);
        let node = n + merges.len();
        parent[left] = node;
        parent[right] = node;
        size[node] = size[left] + size[right];
        merges.push(Merge {
            left,
            right,
            distance,
            size: size[node],
        });
    }
    merges
}

fn lambda(distance: f64) -> f64 {
    if distance > 0.0 {
        (1.0 / distance).min(MAX_LAMBDA)
    } else {
        MAX_LAMBDA
    }
}

fn node_size(n: usize, merges: &[Merge], node: usize) -> usize {
    if node < n {
        1
    } else {
        merges[node - n].size
    }
}

fn leaves(n: usize, merges: &[Merge], node: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        if node < n {
            out.push(node);
        } else {
            let m = merges[node - n];
            stack.push(m.left);
            stack.push(m.right);
        }
    }
    out
}

/// Condensed tree: clusters (index 0 is the root) and, per point, the cluster it fell out of
fn condense(n: usize, merges: &[Merge], min_size: usize) -> (Vec<CondensedCluster>, Vec<usize>) {
    let mut clusters = vec![CondensedCluster {
        parent: None,
        birth: 0.0,
        stability: 0.0,
        children: Vec::new(),
    }];
    let mut exits = vec![0_usize; n];
    let mut stack = vec![(2 * n - 2, 0_usize)];

    while let Some((node, cluster)) = stack.pop() {
        if node < n {
            exits[node] = cluster;
            continue;
        }
        let m = merges[node - n];
        let lam = lambda(m.distance);
        let birth = clusters[cluster].birth;
        let left_big = node_size(n, merges, m.left) >= min_size;
        let right_big = node_size(n, merges, m.right) >= min_size;

        if left_big && right_big {
            for child in [m.left, m.right] {
                let id = clusters.len();
                clusters.push(CondensedCluster {
                    parent: Some(cluster),
                    birth: lam,
                    stability: 0.0,
                    children: Vec::new(),
                });
                clusters[cluster].children.push(id);
                clusters[cluster].stability +=
                    (lam - birth) * node_size(n, merges, child) as f64;
                stack.push((child, id));
            }
            continue;
        }

        for (child, big) in [(m.left, left_big), (m.right, right_big)] {
            if big {
                stack.push((child, cluster));
            } else {
                for point in leaves(n, merges, child) {
                    exits[point] = cluster;
                    clusters[cluster].stability += lam - birth;
                }
            }
        }
    }
    (clusters, exits)
}

/// Excess-of-mass selection; the root is never selected
fn select_clusters(clusters: &[CondensedCluster]) -> Vec<bool> {
    let mut selected = vec![false; clusters.len()];
    let mut value = vec![0.0; clusters.len()];

    for c in (1..clusters.len()).rev() {
        let children: f64 = clusters[c].children.iter().map(|&ch| value[ch]).sum();
        if clusters[c].children.is_empty() || clusters[c].stability >= children {
            selected[c] = true;
            value[c] = clusters[c].stability;
        } else {
            value[c] = children;
        }
    }

    // a selected cluster absorbs its descendants; parents precede children
    let mut covered = vec![false; clusters.len()];
    for c in 1..clusters.len() {
        if let Some(p) = clusters[c].parent {
            if selected[p] || covered[p] {
                covered[c] = true;
                selected[c] = false;
            }
        }
    }
    selected
}

fn label_points(clusters: &[CondensedCluster], exits: &[usize], selected: &[bool]) -> Vec<i64> {
    let mut label_of = vec![NOISE; clusters.len()];
    let mut next = 0;
    for (c, &sel) in selected.iter().enumerate() {
        if sel {
            label_of[c] = next;
            next += 1;
        }
    }

    exits
        .iter()
        .map(|&start| {
            let mut cluster = Some(start);
            while let Some(c) = cluster {
                if selected[c] {
                    return label_of[c];
                }
                cluster = clusters[c].parent;
            }
            NOISE
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(values: &[f64]) -> Vec<Vec<f64>> {
        values.iter().map(|v| vec![*v]).collect()
    }

    #[test]
    fn test_two_dense_groups() {
        let mut values: Vec<f64> = (0..20).map(|i| 10.0 + i as f64 * 0.1).collect();
        values.extend((0..20).map(|i| 50.0 + i as f64 * 0.1));
        let labels = hdbscan(&line(&values), 5);

        let first = labels[0];
        let second = labels[20];
        assert_ne!(first, NOISE);
        assert_ne!(second, NOISE);
        assert_ne!(first, second);
        assert!(labels[..20].iter().all(|&l| l == first));
        assert!(labels[20..].iter().all(|&l| l == second));
    }

    #[test]
    fn test_outlier_is_noise() {
        let mut values: Vec<f64> = (0..15).map(|i| i as f64 * 0.1).collect();
        values.extend((0..15).map(|i| 20.0 + i as f64 * 0.1));
        values.push(1000.0);
        let labels = hdbscan(&line(&values), 4);
        assert_eq!(*labels.last().unwrap(), NOISE);
        assert_ne!(labels[0], labels[15]);
    }

    #[test]
    fn test_min_cluster_size() {
        let strategy = Hdbscan {
            min_cluster_fraction: 0.05,
        };
        assert_eq!(strategy.min_cluster_size(10), 2);
        assert_eq!(strategy.min_cluster_size(200), 10);
    }

    #[test]
    fn test_uniform_data_has_no_split() {
        let points = line(&[1.0, 1.0, 1.0, 1.0]);
        let strategy = Hdbscan {
            min_cluster_fraction: 0.5,
        };
        let data: Vec<Observation> = points
            .into_iter()
            .enumerate()
            .map(|(i, p)| Observation {
                id: i.to_string(),
                numeric: p,
                categorical: Vec::new(),
            })
            .collect();
        assert!(strategy.fit(&data).is_err());
    }
}
