//! Quantized metric-measure spaces: a cell reduced to its clusters,
//! carrying enough cached moments (`c_a`, `c_as`, `a_s_a_s`) that `qgw`
//! never has to touch the full-resolution distance matrix more than
//! once per pair.

use crate::clustering::centroid_linkage_labels;
use crate::error::{CellError, Result};
use crate::matrix::SquareMatrix;
use crate::mmspace::{frobenius_moment, MMSpace};
use log::debug;

/// A cell together with a clustering of its points, sorted so that
/// points in the same cluster are contiguous and each cluster's medoid
/// comes first within its block.
#[derive(Debug, Clone)]
pub struct QuantizedMMSpace {
    pub name: Option<String>,
    pub n: usize,
    /// Full-resolution distance matrix, reordered to cluster-contiguous,
    /// medoid-first layout.
    pub icdm: SquareMatrix,
    /// `mu`, reordered to match `icdm`.
    pub distribution: Vec<f64>,
    /// Number of clusters actually formed (may be less than requested
    /// if points coincide or `n` was small).
    pub ns: usize,
    /// Start offset of each cluster's block in the reordered point
    /// order; length `ns + 1`, with `q_indices[ns] == n`.
    pub q_indices: Vec<usize>,
    /// Cluster-level distance matrix between medoids, `ns x ns`.
    pub sub_icdm: SquareMatrix,
    /// Cluster-level probability mass, `q_distribution[i] = sum of
    /// `distribution` over cluster `i`'s block.
    pub q_distribution: Vec<f64>,
    /// `<mu (x) mu, D (.) D>` on the full-resolution space.
    pub c_a: f64,
    /// `<q (x) q, A_s (.) A_s>` on the cluster-level space.
    pub c_as: f64,
    /// `A_s @ q_distribution`, one entry per cluster.
    pub a_s_a_s: Vec<f64>,
}

impl QuantizedMMSpace {
    /// Clusters `mms` by centroid linkage down to at most `num_clusters`
    /// groups.
    pub fn from_num_clusters(mms: &MMSpace, num_clusters: usize, seed: u64) -> Result<Self> {
        if num_clusters == 0 {
            return Err(CellError::BadClusterCount {
                num_clusters,
                n: mms.n,
            });
        }
        let labels = centroid_linkage_labels(&mms.d, num_clusters, seed);
        let qmms = Self::from_labels(mms, &labels)?;
        if qmms.ns < num_clusters {
            debug!(
                "clustering collapsed to {} clusters (requested {}); continuing",
                qmms.ns, num_clusters
            );
        }
        Ok(qmms)
    }

    /// Builds a quantized space from caller-supplied cluster labels
    /// instead of deriving them; `labels` must be 0-based, contiguous,
    /// and cover every point in `mms`.
    pub fn from_labels(mms: &MMSpace, labels: &[u32]) -> Result<Self> {
        let n = mms.n;
        if labels.len() != n {
            return Err(CellError::BadLabels {
                n,
                msg: format!("got {} labels for {} points", labels.len(), n),
            });
        }
        let ns = validate_contiguous_labels(labels, n)?;

        // Stable sort by label, tie-broken by original index, so each
        // cluster's points stay in relative order before the
        // medoid-first reordering below.
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| labels[i]);

        let mut icdm = reorder_matrix(&mms.d, &order);
        let mut distribution: Vec<f64> = order.iter().map(|&i| mms.mu[i]).collect();
        let sorted_labels: Vec<u32> = order.iter().map(|&i| labels[i]).collect();

        let mut q_indices = Vec::with_capacity(ns + 1);
        let mut start = 0usize;
        for cluster in 0..ns as u32 {
            q_indices.push(start);
            let end = start
                + sorted_labels[start..]
                    .iter()
                    .take_while(|&&l| l == cluster)
                    .count();
            reorder_block_medoid_first(&mut icdm, &mut distribution, start, end);
            start = end;
        }
        q_indices.push(n);

        let q_distribution: Vec<f64> = (0..ns)
            .map(|i| distribution[q_indices[i]..q_indices[i + 1]].iter().sum())
            .collect();
        let q_sum: f64 = q_distribution.iter().sum();
        debug_assert!((q_sum - 1.0).abs() < 1e-6, "q_distribution sums to {q_sum}");

        let medoid_indices: Vec<usize> = (0..ns).map(|i| q_indices[i]).collect();
        let sub_icdm = restrict(&icdm, &medoid_indices);

        let c_a = frobenius_moment(&icdm, &distribution);
        let c_as = frobenius_moment(&sub_icdm, &q_distribution);
        let a_s_a_s: Vec<f64> = (0..ns)
            .map(|i| {
                (0..ns)
                    .map(|j| sub_icdm.get(i, j) * q_distribution[j])
                    .sum()
            })
            .collect();

        Ok(QuantizedMMSpace {
            name: mms.name.clone(),
            n,
            icdm,
            distribution,
            ns,
            q_indices,
            sub_icdm,
            q_distribution,
            c_a,
            c_as,
            a_s_a_s,
        })
    }
}

fn validate_contiguous_labels(labels: &[u32], n: usize) -> Result<usize> {
    let max_label = labels.iter().copied().max().unwrap_or(0);
    let ns = max_label as usize + 1;
    let mut seen = vec![false; ns];
    for &l in labels {
        seen[l as usize] = true;
    }
    if let Some(missing) = seen.iter().position(|&s| !s) {
        return Err(CellError::BadLabels {
            n,
            msg: format!("label {missing} has no points assigned"),
        });
    }
    Ok(ns)
}

fn reorder_matrix(d: &SquareMatrix, order: &[usize]) -> SquareMatrix {
    let n = order.len();
    let mut out = SquareMatrix::zeros(n);
    for (new_i, &old_i) in order.iter().enumerate() {
        for (new_j, &old_j) in order.iter().enumerate() {
            out.set(new_i, new_j, d.get(old_i, old_j));
        }
    }
    out
}

fn restrict(d: &SquareMatrix, indices: &[usize]) -> SquareMatrix {
    let k = indices.len();
    let mut out = SquareMatrix::zeros(k);
    for (i, &oi) in indices.iter().enumerate() {
        for (j, &oj) in indices.iter().enumerate() {
            out.set(i, j, d.get(oi, oj));
        }
    }
    out
}

/// Within the half-open block `[start, end)`, moves the medoid (point
/// minimizing its distance-sum within the block) to the front, then
/// sorts the rest by ascending distance from the medoid. Operates by
/// computing a local permutation and reapplying it to both `icdm`
/// (rows and columns) and `distribution`.
fn reorder_block_medoid_first(
    icdm: &mut SquareMatrix,
    distribution: &mut [f64],
    start: usize,
    end: usize,
) {
    let block_len = end - start;
    if block_len <= 1 {
        return;
    }

    let mut medoid_local = 0usize;
    let mut best_sum = f64::INFINITY;
    for local_i in 0..block_len {
        let global_i = start + local_i;
        let sum: f64 = (start..end).map(|global_j| icdm.get(global_i, global_j)).sum();
        if sum < best_sum {
            best_sum = sum;
            medoid_local = local_i;
        }
    }

    let medoid_global = start + medoid_local;
    let mut local_order: Vec<usize> = (0..block_len).collect();
    local_order.sort_by(|&a, &b| {
        let da = icdm.get(medoid_global, start + a);
        let db = icdm.get(medoid_global, start + b);
        da.partial_cmp(&db)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let global_order: Vec<usize> = local_order.iter().map(|&l| start + l).collect();

    let sub = restrict(icdm, &global_order);
    for li in 0..block_len {
        for lj in 0..block_len {
            icdm.set(start + li, start + lj, sub.get(li, lj));
        }
    }
    // Cross terms between this block and the rest of the matrix also
    // need the permutation applied along the block's axis.
    let n = icdm.n;
    let mut row_buf = vec![0.0; n];
    let snapshot = icdm.clone();
    for (new_local, &old_global) in global_order.iter().enumerate() {
        for col in 0..n {
            row_buf[col] = snapshot.get(old_global, col);
        }
        for col in 0..n {
            if col >= start && col < end {
                continue; // already handled by the block-local `sub` above
            }
            icdm.set(start + new_local, col, row_buf[col]);
        }
    }
    for (new_local, &old_global) in global_order.iter().enumerate() {
        for row in 0..n {
            if row >= start && row < end {
                continue;
            }
            icdm.set(row, start + new_local, snapshot.get(row, old_global));
        }
    }

    let dist_snapshot: Vec<f64> = (start..end).map(|i| distribution[i]).collect();
    for (local_i, &old_local) in local_order.iter().enumerate() {
        distribution[start + local_i] = dist_snapshot[old_local];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmspace::uniform;

    fn square(n: usize, rows: &[&[f64]]) -> SquareMatrix {
        let mut data = Vec::with_capacity(n * n);
        for row in rows {
            data.extend_from_slice(row);
        }
        SquareMatrix::from_row_major(n, data)
    }

    #[test]
    fn from_labels_rejects_gap() {
        let d = square(3, &[&[0.0, 1.0, 2.0], &[1.0, 0.0, 1.0], &[2.0, 1.0, 0.0]]);
        let mms = MMSpace::new(None, d, uniform(3)).unwrap();
        let err = QuantizedMMSpace::from_labels(&mms, &[0, 2, 2]);
        assert!(matches!(err, Err(CellError::BadLabels { .. })));
    }

    #[test]
    fn q_distribution_sums_to_one() {
        let d = square(
            4,
            &[
                &[0.0, 1.0, 9.0, 10.0],
                &[1.0, 0.0, 9.0, 10.0],
                &[9.0, 9.0, 0.0, 1.0],
                &[10.0, 10.0, 1.0, 0.0],
            ],
        );
        let mms = MMSpace::new(None, d, uniform(4)).unwrap();
        let q = QuantizedMMSpace::from_labels(&mms, &[0, 0, 1, 1]).unwrap();
        assert_eq!(q.ns, 2);
        let total: f64 = q.q_distribution.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(q.sub_icdm.n, 2);
    }

    #[test]
    fn medoid_is_first_in_each_block() {
        let d = square(
            3,
            &[&[0.0, 1.0, 5.0], &[1.0, 0.0, 4.0], &[5.0, 4.0, 0.0]],
        );
        let mms = MMSpace::new(None, d, uniform(3)).unwrap();
        let q = QuantizedMMSpace::from_labels(&mms, &[0, 0, 0]).unwrap();
        // medoid of the full 3-point cluster minimizes row-sum; point 0's
        // row sums to 6, point 1's to 5, point 2's to 9, so point 1 (now
        // reindexed to position 0) should be the medoid.
        assert!((q.icdm.get(0, 0)).abs() < 1e-12);
        assert_eq!(q.q_indices, vec![0, 3]);
    }

    #[test]
    fn from_num_clusters_roundtrips_moments() {
        let d = square(
            4,
            &[
                &[0.0, 1.0, 9.0, 10.0],
                &[1.0, 0.0, 9.0, 10.0],
                &[9.0, 9.0, 0.0, 1.0],
                &[10.0, 10.0, 1.0, 0.0],
            ],
        );
        let mms = MMSpace::new(None, d, uniform(4)).unwrap();
        let q = QuantizedMMSpace::from_num_clusters(&mms, 2, 0).unwrap();
        assert!((q.c_a - mms.c_a).abs() < 1e-9);
    }
}
