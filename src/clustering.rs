//! Centroid-linkage agglomerative clustering, used to cut each cell's
//! points down to a handful of clusters for the quantized
//! representation.
//!
//! Scipy's `cluster.hierarchy.linkage(..., method="centroid")` plus
//! `fcluster(..., criterion="maxclust")` is the two-step process this
//! mirrors; since only a distance matrix is available (no point
//! coordinates), cluster-to-cluster distances are maintained directly
//! via the Lance-Williams centroid update instead of recomputing
//! centroids from scratch after every merge.

use crate::matrix::SquareMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Cuts `d` into at most `num_clusters` groups by centroid-linkage
/// agglomeration, returning contiguous 0-based labels, one per point.
/// Ties for the nearest pair of clusters are broken with `seed` rather
/// than array order, so repeated runs are reproducible but not an
/// artifact of point-index ordering.
pub fn centroid_linkage_labels(d: &SquareMatrix, num_clusters: usize, seed: u64) -> Vec<u32> {
    let n = d.n;
    let k = num_clusters.min(n).max(1);

    if n == 1 || k == n {
        return (0..n as u32).collect();
    }

    let mut rng = StdRng::seed_from_u64(seed);

    // Squared cluster-to-cluster distances; updated in place via the
    // centroid Lance-Williams recurrence as clusters merge.
    let mut dist_sq = vec![0.0_f64; n * n];
    for i in 0..n {
        for j in 0..n {
            let v = d.get(i, j);
            dist_sq[i * n + j] = v * v;
        }
    }

    let mut active: Vec<bool> = vec![true; n];
    let mut sizes: Vec<usize> = vec![1; n];
    let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let mut num_active = n;

    while num_active > k {
        let mut best_dist = f64::INFINITY;
        let mut candidates: Vec<(usize, usize)> = Vec::new();
        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if !active[j] {
                    continue;
                }
                let dij = dist_sq[i * n + j];
                if dij < best_dist - 1e-12 {
                    best_dist = dij;
                    candidates.clear();
                    candidates.push((i, j));
                } else if dij <= best_dist + 1e-12 {
                    candidates.push((i, j));
                }
            }
        }
        let &(u, v) = candidates
            .choose(&mut rng)
            .expect("at least one active pair while num_active > 1");

        let n_u = sizes[u] as f64;
        let n_v = sizes[v] as f64;
        let denom = n_u + n_v;
        let d_uv = dist_sq[u * n + v];

        for w in 0..n {
            if !active[w] || w == u || w == v {
                continue;
            }
            let d_uw = dist_sq[u * n + w];
            let d_vw = dist_sq[v * n + w];
            let new_d = ((n_u * d_uw + n_v * d_vw) / denom - (n_u * n_v * d_uv) / (denom * denom))
                .max(0.0);
            dist_sq[u * n + w] = new_d;
            dist_sq[w * n + u] = new_d;
        }

        let moved = std::mem::take(&mut members[v]);
        members[u].extend(moved);
        sizes[u] += sizes[v];
        active[v] = false;
        num_active -= 1;
    }

    let mut labels = vec![0u32; n];
    let mut next_label = 0u32;
    for cluster_idx in 0..n {
        if !active[cluster_idx] {
            continue;
        }
        for &point in &members[cluster_idx] {
            labels[point] = next_label;
        }
        next_label += 1;
    }
    labels
}
