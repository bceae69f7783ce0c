//! Quantized Gromov-Wasserstein: coarse GW on cluster medoids, then a
//! comonotone local refinement within each matched block pair, giving
//! an upper bound on the true GW distance at a fraction of the cost.

use crate::dispatcher::Dispatcher;
use crate::gw::{frobenius_inner, gw, independent_coupling, sandwich};
use crate::matrix::{Plan, SquareMatrix};
use crate::mmspace::MMSpace;
use crate::qmms::QuantizedMMSpace;

/// Coarse transport plan between two sets of cluster medoids. When
/// either side has a single cluster the plan is forced (there is only
/// one feasible coupling), so the GW kernel is skipped entirely;
/// `MMSpace::new` requires at least two points and would otherwise
/// reject the singleton sub-space.
fn coarse_plan(a: &QuantizedMMSpace, b: &QuantizedMMSpace, initial_plan: Option<Plan>) -> Plan {
    if a.ns >= 2 && b.ns >= 2 {
        let ma = MMSpace::new(None, a.sub_icdm.clone(), a.q_distribution.clone())
            .expect("sub_icdm is always square, symmetric, and its measure sums to 1");
        let mb = MMSpace::new(None, b.sub_icdm.clone(), b.q_distribution.clone())
            .expect("sub_icdm is always square, symmetric, and its measure sums to 1");
        gw(&ma, &mb, initial_plan, 100, 1e-9).0
    } else {
        independent_coupling(&a.q_distribution, &b.q_distribution)
    }
}

/// Comonotone 1D optimal transport between two marginals already
/// ordered consistently (here: both by ascending distance from their
/// cluster's medoid). For monotone costs the northwest-corner coupling
/// is optimal, so no simplex iteration is needed.
fn northwest_plan(row_target: &[f64], col_target: &[f64]) -> Vec<(usize, usize, f64)> {
    let mut remaining_row = row_target.to_vec();
    let mut remaining_col = col_target.to_vec();
    let rows = remaining_row.len();
    let cols = remaining_col.len();

    let mut entries = Vec::new();
    let mut i = 0usize;
    let mut j = 0usize;
    while i < rows && j < cols {
        let amt = remaining_row[i].min(remaining_col[j]);
        if amt > 0.0 {
            entries.push((i, j, amt));
        }
        remaining_row[i] -= amt;
        remaining_col[j] -= amt;
        if remaining_row[i] <= 1e-15 && i < rows - 1 {
            i += 1;
        } else if remaining_col[j] <= 1e-15 {
            j += 1;
        } else {
            i += 1;
        }
    }
    entries
}

/// Redistributes each coarse block-pair's mass across its constituent
/// points, assembling the dense full-resolution plan. Block `k` in `A`
/// gets row targets `distribution_A[p] * (P_coarse[k,l] /
/// q_distribution_A[k])` for each point `p` in the block, which sums
/// back to `P_coarse[k,l]` and, summed across every matched `l`, to
/// `distribution_A[p]` exactly — so `P_full`'s marginals are exact.
fn refine(a: &QuantizedMMSpace, b: &QuantizedMMSpace, coarse: &Plan) -> Plan {
    let mut full = Plan::zeros(a.n, b.n);

    for k in 0..a.ns {
        for l in 0..b.ns {
            let mass = coarse.get(k, l);
            if mass <= 0.0 {
                continue;
            }
            let a_start = a.q_indices[k];
            let a_end = a.q_indices[k + 1];
            let b_start = b.q_indices[l];
            let b_end = b.q_indices[l + 1];

            let row_target: Vec<f64> = a.distribution[a_start..a_end]
                .iter()
                .map(|&m| m * (mass / a.q_distribution[k]))
                .collect();
            let col_target: Vec<f64> = b.distribution[b_start..b_end]
                .iter()
                .map(|&m| m * (mass / b.q_distribution[l]))
                .collect();

            for (li, lj, value) in northwest_plan(&row_target, &col_target) {
                full.add(a_start + li, b_start + lj, value);
            }
        }
    }

    full
}

/// `qgw(A, B) -> (P_full, distance)`: coarse GW on medoids, comonotone
/// local refinement, then the exact Frobenius-contraction distance on
/// the full-resolution intracell matrices.
pub fn qgw(a: &QuantizedMMSpace, b: &QuantizedMMSpace, initial_plan: Option<Plan>) -> (Plan, f64) {
    let coarse = coarse_plan(a, b, initial_plan);
    let full = refine(a, b, &coarse);

    let cross = frobenius_inner(&sandwich(&a.icdm, &full, &b.icdm), &full);
    let loss = a.c_a + b.c_a - 2.0 * cross;
    let dist = loss.max(0.0).sqrt() / 2.0;

    (full, dist)
}

/// Full pairwise qGW matrix over a population, dispatched in parallel
/// over unordered pairs, mirroring [`crate::slb::slb_all`].
pub fn qgw_all(
    cells: &[QuantizedMMSpace],
    chunksize: usize,
    dispatcher: &impl Dispatcher,
) -> SquareMatrix {
    let n = cells.len();
    let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push((i, j));
        }
    }

    let results = dispatcher.map_unordered(cells, &pairs, chunksize, |cells, &(i, j)| {
        qgw(&cells[i], &cells[j], None).1
    });

    let mut out = SquareMatrix::zeros(n);
    for ((i, j), value) in pairs.into_iter().zip(results) {
        out.set_symmetric(i, j, value);
    }
    out
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
    fn identical_cells_have_zero_qgw_distance() {
        let d = square(
            4,
            &[
                &[0.0, 1.0, 9.0, 10.0],
                &[1.0, 0.0, 9.0, 10.0],
                &[9.0, 9.0, 0.0, 1.0],
                &[10.0, 10.0, 1.0, 0.0],
            ],
        );
        let mms = MMSpace::new(None, d.clone(), uniform(4)).unwrap();
        let a = QuantizedMMSpace::from_num_clusters(&mms, 2, 0).unwrap();
        let mms_b = MMSpace::new(None, d, uniform(4)).unwrap();
        let b = QuantizedMMSpace::from_num_clusters(&mms_b, 2, 0).unwrap();

        let (plan, dist) = qgw(&a, &b, None);
        assert!(dist < 1e-6, "dist = {dist}");
        for (r, expected) in plan.row_sums().iter().zip(a.distribution.iter()) {
            assert!((r - expected).abs() < 1e-6);
        }
        for (c, expected) in plan.col_sums().iter().zip(b.distribution.iter()) {
            assert!((c - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn distinct_cells_have_positive_qgw_distance() {
        let da = square(
            4,
            &[
                &[0.0, 1.0, 9.0, 10.0],
                &[1.0, 0.0, 9.0, 10.0],
                &[9.0, 9.0, 0.0, 1.0],
                &[10.0, 10.0, 1.0, 0.0],
            ],
        );
        let db = square(
            4,
            &[
                &[0.0, 3.0, 20.0, 25.0],
                &[3.0, 0.0, 20.0, 25.0],
                &[20.0, 20.0, 0.0, 4.0],
                &[25.0, 25.0, 4.0, 0.0],
            ],
        );
        let ma = MMSpace::new(None, da, uniform(4)).unwrap();
        let mb = MMSpace::new(None, db, uniform(4)).unwrap();
        let a = QuantizedMMSpace::from_num_clusters(&ma, 2, 0).unwrap();
        let b = QuantizedMMSpace::from_num_clusters(&mb, 2, 0).unwrap();
        let (_plan, dist) = qgw(&a, &b, None);
        assert!(dist > 0.0);
    }

    #[test]
    fn single_cluster_each_side_uses_forced_plan() {
        let da = square(2, &[&[0.0, 1.0], &[1.0, 0.0]]);
        let db = square(2, &[&[0.0, 2.0], &[2.0, 0.0]]);
        let ma = MMSpace::new(None, da, uniform(2)).unwrap();
        let mb = MMSpace::new(None, db, uniform(2)).unwrap();
        let a = QuantizedMMSpace::from_num_clusters(&ma, 1, 0).unwrap();
        let b = QuantizedMMSpace::from_num_clusters(&mb, 1, 0).unwrap();
        assert_eq!(a.ns, 1);
        assert_eq!(b.ns, 1);
        let (plan, _dist) = qgw(&a, &b, None);
        for (r, expected) in plan.row_sums().iter().zip(a.distribution.iter()) {
            assert!((r - expected).abs() < 1e-9);
        }
    }
}
