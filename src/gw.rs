//! Gromov-Wasserstein kernel: conditional-gradient (Frank-Wolfe) descent
//! over transport plans, each step's linear subproblem solved exactly by
//! [`crate::ot::transportation_simplex`].
//!
//! For the squared-loss cost `(Ca_ik - Cb_jl)^2`, the GW objective
//! decomposes as `c_a + c_b - 2<Ca P Cb^T, P>` where `c_a`, `c_b` are
//! constants fixed by the marginals (`MMSpace::c_a`). Minimizing over
//! feasible `P` is therefore equivalent to maximizing `<Ca P Cb^T, P>`,
//! a quadratic program whose linearization at the current iterate is a
//! plain linear OT problem with cost `-2 Ca P Cb^T`.

use crate::matrix::{Plan, SquareMatrix};
use crate::mmspace::MMSpace;
use crate::ot::transportation_simplex;

/// `(Ca @ X @ Cb^T)[i, j] = sum_k sum_l Ca[i,k] X[k,l] Cb[j,l]`, computed
/// as two dense matmuls (`O(n1 n2 max(n1,n2))`) rather than the naive
/// four-index sum.
pub(crate) fn sandwich(ca: &SquareMatrix, x: &Plan, cb: &SquareMatrix) -> Plan {
    let n1 = ca.n;
    let n2 = cb.n;
    debug_assert_eq!(x.rows, n1);
    debug_assert_eq!(x.cols, n2);

    // m[i, l] = sum_k Ca[i,k] * X[k,l]
    let mut m = vec![0.0; n1 * n2];
    for i in 0..n1 {
        let ca_row = ca.row(i);
        for k in 0..n1 {
            let cik = ca_row[k];
            if cik == 0.0 {
                continue;
            }
            let x_row = &x.as_slice()[k * n2..(k + 1) * n2];
            let out_row = &mut m[i * n2..(i + 1) * n2];
            for l in 0..n2 {
                out_row[l] += cik * x_row[l];
            }
        }
    }

    // out[i, j] = sum_l m[i,l] * Cb[j,l]
    let mut out = Plan::zeros(n1, n2);
    for i in 0..n1 {
        let m_row = &m[i * n2..(i + 1) * n2];
        for j in 0..n2 {
            let cb_row = cb.row(j);
            let mut acc = 0.0;
            for l in 0..n2 {
                acc += m_row[l] * cb_row[l];
            }
            out.set(i, j, acc);
        }
    }
    out
}

pub(crate) fn frobenius_inner(x: &Plan, y: &Plan) -> f64 {
    x.as_slice().iter().zip(y.as_slice()).map(|(a, b)| a * b).sum()
}

/// Product-measure plan `mu (x) nu`, the standard Frank-Wolfe starting
/// point when the caller has no warm start.
pub fn independent_coupling(mu: &[f64], nu: &[f64]) -> Plan {
    let mut plan = Plan::zeros(mu.len(), nu.len());
    for (i, &mi) in mu.iter().enumerate() {
        for (j, &nj) in nu.iter().enumerate() {
            plan.set(i, j, mi * nj);
        }
    }
    plan
}

/// Squared-loss GW objective `L(P) = c_a + c_b - 2<Ca P Cb^T, P>`.
pub fn gw_loss(a: &MMSpace, b: &MMSpace, plan: &Plan) -> f64 {
    let cross = frobenius_inner(&sandwich(&a.d, plan, &b.d), plan);
    a.c_a + b.c_a - 2.0 * cross
}

/// Closed-form minimizer of the quadratic restriction of `L` to the
/// segment `P + gamma*(P' - P)`, `gamma` in `[0, 1]`.
fn line_search(a2: f64, a1: f64) -> f64 {
    if a2 > 1e-12 {
        (-a1 / (2.0 * a2)).clamp(0.0, 1.0)
    } else if a2 + a1 < 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Runs conditional-gradient descent on the GW objective starting from
/// `initial_plan` (or the product coupling, if `None`), returning the
/// final plan and `sqrt(max(0, L)) / 2`, the GW distance.
///
/// Each iteration: linearize at the current plan, solve the resulting
/// linear OT problem exactly via [`transportation_simplex`], then take
/// the closed-form optimal step along the segment toward that solution.
/// Terminates when the step size hits zero (already at a stationary
/// point) or the loss improvement drops below `tol`, whichever first.
pub fn gw(
    a: &MMSpace,
    b: &MMSpace,
    initial_plan: Option<Plan>,
    max_iter: usize,
    tol: f64,
) -> (Plan, f64) {
    let mut plan = initial_plan.unwrap_or_else(|| independent_coupling(&a.mu, &b.mu));
    let mut loss = gw_loss(a, b, &plan);

    for _ in 0..max_iter {
        // cost = -2 * Ca @ P @ Cb^T, the gradient direction for the linear
        // subproblem (additive marginal-only constants dropped: they do
        // not affect the argmin over feasible plans).
        let grad = sandwich(&a.d, &plan, &b.d);
        let cost: Vec<f64> = grad.as_slice().iter().map(|v| -2.0 * v).collect();

        let direction = transportation_simplex(&a.mu, &b.mu, &cost, 200);

        let delta_data: Vec<f64> = direction
            .as_slice()
            .iter()
            .zip(plan.as_slice())
            .map(|(d, p)| d - p)
            .collect();
        let mut delta = Plan::zeros(plan.rows, plan.cols);
        for (idx, &v) in delta_data.iter().enumerate() {
            delta.set(idx / delta.cols, idx % delta.cols, v);
        }

        let cross_pd = frobenius_inner(&sandwich(&a.d, &plan, &b.d), &delta);
        let cross_dp = frobenius_inner(&sandwich(&a.d, &delta, &b.d), &plan);
        let cross_dd = frobenius_inner(&sandwich(&a.d, &delta, &b.d), &delta);

        let a2 = -2.0 * cross_dd;
        let a1 = -2.0 * (cross_pd + cross_dp);
        let gamma = line_search(a2, a1);

        if gamma <= 0.0 {
            break;
        }

        let new_data: Vec<f64> = plan
            .as_slice()
            .iter()
            .zip(delta.as_slice())
            .map(|(p, d)| p + gamma * d)
            .collect();
        let mut new_plan = Plan::zeros(plan.rows, plan.cols);
        for (idx, &v) in new_data.iter().enumerate() {
            new_plan.set(idx / new_plan.cols, idx % new_plan.cols, v);
        }

        let new_loss = gw_loss(a, b, &new_plan);
        let improved = loss - new_loss;
        plan = new_plan;
        loss = new_loss;
        if improved.abs() < tol {
            break;
        }
    }

    let dist = (loss.max(0.0)).sqrt() / 2.0;
    (plan, dist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::SquareMatrix;
    use crate::mmspace::uniform;

    fn square(n: usize, rows: &[&[f64]]) -> SquareMatrix {
        let mut data = Vec::with_capacity(n * n);
        for row in rows {
            data.extend_from_slice(row);
        }
        SquareMatrix::from_row_major(n, data)
    }

    #[test]
    fn identical_spaces_have_zero_distance() {
        let d = square(3, &[&[0.0, 1.0, 2.0], &[1.0, 0.0, 1.0], &[2.0, 1.0, 0.0]]);
        let a = MMSpace::new(None, d.clone(), uniform(3)).unwrap();
        let b = MMSpace::new(None, d, uniform(3)).unwrap();
        let (plan, dist) = gw(&a, &b, None, 50, 1e-12);
        assert!(dist < 1e-6, "dist = {dist}");
        let row_sums = plan.row_sums();
        for (r, expected) in row_sums.iter().zip(a.mu.iter()) {
            assert!((r - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn rescaled_space_has_positive_distance() {
        let da = square(3, &[&[0.0, 1.0, 2.0], &[1.0, 0.0, 1.0], &[2.0, 1.0, 0.0]]);
        let db = square(3, &[&[0.0, 5.0, 10.0], &[5.0, 0.0, 5.0], &[10.0, 5.0, 0.0]]);
        let a = MMSpace::new(None, da, uniform(3)).unwrap();
        let b = MMSpace::new(None, db, uniform(3)).unwrap();
        let (_plan, dist) = gw(&a, &b, None, 100, 1e-12);
        assert!(dist > 0.0);
    }

    #[test]
    fn plan_is_marginally_feasible() {
        let da = square(3, &[&[0.0, 1.0, 3.0], &[1.0, 0.0, 2.0], &[3.0, 2.0, 0.0]]);
        let db = square(4, &[
            &[0.0, 1.0, 2.0, 3.0],
            &[1.0, 0.0, 1.0, 2.0],
            &[2.0, 1.0, 0.0, 1.0],
            &[3.0, 2.0, 1.0, 0.0],
        ]);
        let a = MMSpace::new(None, da, uniform(3)).unwrap();
        let b = MMSpace::new(None, db, uniform(4)).unwrap();
        let (plan, _dist) = gw(&a, &b, None, 100, 1e-12);
        for (r, expected) in plan.row_sums().iter().zip(a.mu.iter()) {
            assert!((r - expected).abs() < 1e-6);
        }
        for (c, expected) in plan.col_sums().iter().zip(b.mu.iter()) {
            assert!((c - expected).abs() < 1e-6);
        }
    }
}
