//! Exact linear optimal transport via the transportation simplex
//! (northwest-corner initialization, MODI dual potentials,
//! stepping-stone pivoting). No entropic regularization: the GW kernel
//! needs a solver whose fixed points are genuine optimal transport
//! plans, not Sinkhorn's regularized approximation.

use crate::matrix::Plan;
use std::collections::HashSet;

const RC_TOL: f64 = 1e-9;

/// Solves `min <C, P>` subject to `P`'s row sums equal `a`, column sums
/// equal `b`, `P >= 0`, for balanced problems (`sum(a) == sum(b)`).
/// `cost` is `a.len() x b.len()` row-major. Returns the optimal plan;
/// gives up after `max_iter` pivots and returns the best plan found so
/// far (callers bound this with a generous cap since this module is
/// only ever handed the small coarse/cluster-local subproblems that
/// `qgw` issues).
pub fn transportation_simplex(a: &[f64], b: &[f64], cost: &[f64], max_iter: usize) -> Plan {
    let m = a.len();
    let n = b.len();
    assert_eq!(cost.len(), m * n, "cost must be m*n");

    let (mut plan, mut basis) = northwest_corner(a, b, n);

    for _ in 0..max_iter {
        let (u, v) = compute_potentials(m, n, cost, n, &basis);

        let mut best: Option<(f64, usize, usize)> = None;
        for i in 0..m {
            for j in 0..n {
                if basis.contains(&(i, j)) {
                    continue;
                }
                let rc = cost[i * n + j] - u[i] - v[j];
                if rc < -RC_TOL {
                    match best {
                        Some((br, _, _)) if rc >= br => {}
                        _ => best = Some((rc, i, j)),
                    }
                }
            }
        }

        let (_, ei, ej) = match best {
            Some(x) => x,
            None => break,
        };

        let cycle = find_cycle(m, n, &basis, (ei, ej));

        let mut theta = f64::INFINITY;
        let mut leaving: Option<(usize, usize)> = None;
        for (idx, &(i, j)) in cycle.iter().enumerate() {
            if idx % 2 == 1 {
                let val = plan.get(i, j);
                let better = match leaving {
                    None => true,
                    Some(lv) => val < theta || (val == theta && (i, j) < lv),
                };
                if better {
                    theta = val;
                    leaving = Some((i, j));
                }
            }
        }
        let theta = theta.max(0.0);

        for (idx, &(i, j)) in cycle.iter().enumerate() {
            if idx % 2 == 0 {
                plan.add(i, j, theta);
            } else {
                plan.add(i, j, -theta);
            }
        }

        basis.insert((ei, ej));
        if let Some(lv) = leaving {
            if lv != (ei, ej) {
                basis.remove(&lv);
                plan.set(lv.0, lv.1, 0.0);
            }
        }
    }

    plan
}

/// Initial basic feasible solution. The tie-breaking rule (advance only
/// one pointer when supply and demand empty simultaneously) leaves the
/// next cell to be filled with a zero-valued basic entry on the
/// following iteration, which is what keeps the basis at exactly
/// `m + n - 1` cells (a spanning tree) even through degenerate ties.
fn northwest_corner(a: &[f64], b: &[f64], n: usize) -> (Plan, HashSet<(usize, usize)>) {
    let m = a.len();
    let mut supply = a.to_vec();
    let mut demand = b.to_vec();
    let mut plan = Plan::zeros(m, n);
    let mut basis = HashSet::with_capacity(m + n);

    let mut i = 0usize;
    let mut j = 0usize;
    while i < m - 1 || j < n - 1 {
        let amt = supply[i].min(demand[j]);
        plan.set(i, j, amt);
        basis.insert((i, j));
        supply[i] -= amt;
        demand[j] -= amt;
        if supply[i] <= demand[j] {
            if i < m - 1 {
                i += 1;
            } else {
                j += 1;
            }
        } else if j < n - 1 {
            j += 1;
        } else {
            i += 1;
        }
    }
    let amt = supply[m - 1].min(demand[n - 1]);
    plan.set(m - 1, n - 1, amt);
    basis.insert((m - 1, n - 1));

    (plan, basis)
}

/// `u[i] + v[j] = cost[i,j]` for every basic cell, `u[0] = 0`. The
/// basis forms a spanning tree over the `m + n` row/column nodes, so a
/// handful of passes over the (small) basis list suffices to propagate
/// potentials from the anchor.
fn compute_potentials(
    m: usize,
    n: usize,
    cost: &[f64],
    stride: usize,
    basis: &HashSet<(usize, usize)>,
) -> (Vec<f64>, Vec<f64>) {
    let mut u: Vec<Option<f64>> = vec![None; m];
    let mut v: Vec<Option<f64>> = vec![None; n];
    u[0] = Some(0.0);

    let mut changed = true;
    while changed {
        changed = false;
        for &(i, j) in basis {
            match (u[i], v[j]) {
                (Some(ui), None) => {
                    v[j] = Some(cost[i * stride + j] - ui);
                    changed = true;
                }
                (None, Some(vj)) => {
                    u[i] = Some(cost[i * stride + j] - vj);
                    changed = true;
                }
                _ => {}
            }
        }
    }

    (
        u.into_iter().map(|x| x.unwrap_or(0.0)).collect(),
        v.into_iter().map(|x| x.unwrap_or(0.0)).collect(),
    )
}

/// Finds the unique cycle formed by adding `entering` to the basis
/// tree, ordered starting at `entering` and alternating
/// horizontal/vertical moves, so that even positions gain `theta` and
/// odd positions lose it during a stepping-stone pivot.
fn find_cycle(
    m: usize,
    n: usize,
    basis: &HashSet<(usize, usize)>,
    entering: (usize, usize),
) -> Vec<(usize, usize)> {
    let mut candidates: HashSet<(usize, usize)> = basis.clone();
    candidates.insert(entering);

    loop {
        let mut row_count = vec![0usize; m];
        let mut col_count = vec![0usize; n];
        for &(i, j) in &candidates {
            row_count[i] += 1;
            col_count[j] += 1;
        }
        let to_remove: Vec<(usize, usize)> = candidates
            .iter()
            .copied()
            .filter(|&(i, j)| (i, j) != entering && (row_count[i] <= 1 || col_count[j] <= 1))
            .collect();
        if to_remove.is_empty() {
            break;
        }
        for cell in to_remove {
            candidates.remove(&cell);
        }
    }

    let mut order = vec![entering];
    let mut current = entering;
    let mut horizontal_move = true;
    loop {
        let next = candidates
            .iter()
            .copied()
            .find(|&(i, j)| {
                (i, j) != current
                    && if horizontal_move {
                        i == current.0
                    } else {
                        j == current.1
                    }
            })
            .expect("cycle must close: basis + entering edge forms a unique cycle");
        if next == entering {
            break;
        }
        order.push(next);
        current = next;
        horizontal_move = !horizontal_move;
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_cost(plan: &Plan, cost: &[f64]) -> f64 {
        plan.as_slice().iter().zip(cost).map(|(p, c)| p * c).sum()
    }

    #[test]
    fn two_by_two_matches_hand_solution() {
        // a = [0.5, 0.5], b = [0.5, 0.5], identity-favoring cost.
        let a = [0.5, 0.5];
        let b = [0.5, 0.5];
        let cost = [0.0, 1.0, 1.0, 0.0];
        let plan = transportation_simplex(&a, &b, &cost, 50);
        assert!((total_cost(&plan, &cost) - 0.0).abs() < 1e-9);
        assert!((plan.get(0, 0) - 0.5).abs() < 1e-9);
        assert!((plan.get(1, 1) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn respects_marginals() {
        let a = [0.2, 0.3, 0.5];
        let b = [0.4, 0.6];
        let cost = [1.0, 2.0, 3.0, 1.0, 2.0, 1.0];
        let plan = transportation_simplex(&a, &b, &cost, 100);
        let row_sums = plan.row_sums();
        let col_sums = plan.col_sums();
        for (r, expected) in row_sums.iter().zip(a.iter()) {
            assert!((r - expected).abs() < 1e-9, "{r} vs {expected}");
        }
        for (c, expected) in col_sums.iter().zip(b.iter()) {
            assert!((c - expected).abs() < 1e-9, "{c} vs {expected}");
        }
    }

    #[test]
    fn degenerate_tie_still_terminates() {
        // Supply and demand both split evenly, forcing a northwest-corner
        // tie at every step.
        let a = [0.25, 0.25, 0.25, 0.25];
        let b = [0.25, 0.25, 0.25, 0.25];
        let cost = [
            0.0, 1.0, 2.0, 3.0, 1.0, 0.0, 1.0, 2.0, 2.0, 1.0, 0.0, 1.0, 3.0, 2.0, 1.0, 0.0,
        ];
        let plan = transportation_simplex(&a, &b, &cost, 200);
        let row_sums = plan.row_sums();
        for (r, expected) in row_sums.iter().zip(a.iter()) {
            assert!((r - expected).abs() < 1e-9);
        }
        // The identity coupling is optimal for this cost; total cost 0.
        assert!(total_cost(&plan, &cost).abs() < 1e-9);
    }

    #[test]
    fn beats_northwest_corner_when_suboptimal() {
        // Asymmetric marginals so the northwest-corner BFS is not already
        // optimal and at least one pivot is required.
        let a = [0.9, 0.1];
        let b = [0.1, 0.9];
        let cost = [0.0, 1.0, 1.0, 0.0];
        let plan = transportation_simplex(&a, &b, &cost, 50);
        // 0.1 mass rides the free diagonal on both ends; the remaining 0.8
        // must cross at cost 1, so the optimum is 0.8.
        assert!((total_cost(&plan, &cost) - 0.8).abs() < 1e-6);
    }
}
