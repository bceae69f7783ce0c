//! Second Lower Bound: a cheap, Sinkhorn-free lower bound on the GW
//! distance, computed purely from each cell's inverse-CDF pair.

use crate::dispatcher::Dispatcher;
use crate::matrix::SquareMatrix;
use crate::mmspace::MMSpace;

/// `L2` distance between two right-continuous step functions given as
/// `(x, y)` pairs: `x[k]` is the location of the k-th step, `y[k]` its
/// height contribution (so the function's value on `[x[k], x[k+1])` is
/// `sum(y[0..=k])`). Both `x` sequences start at the same value (`0` in
/// every caller here) and both `y` sequences sum to `1`.
///
/// Walks both step functions left to right with a two-pointer merge,
/// accumulating `(height_a - height_b)^2 * width` over each maximal
/// interval of constant difference. A zero-width interval (duplicate
/// breakpoint in either function) contributes zero regardless of the
/// height difference, so no special tie-breaking is needed at merge
/// points.
fn step_function_l2_sq(xa: &[f64], ya: &[f64], xb: &[f64], yb: &[f64]) -> f64 {
    debug_assert_eq!(xa.len(), ya.len());
    debug_assert_eq!(xb.len(), yb.len());

    let mut i = 0usize;
    let mut j = 0usize;
    let mut height_a = 0.0_f64;
    let mut height_b = 0.0_f64;
    let mut prev_x = 0.0_f64;
    let mut acc = 0.0_f64;

    // Prime both accumulated heights with the mass at x=0.
    if i < xa.len() && xa[i] == prev_x {
        height_a += ya[i];
        i += 1;
    }
    if j < xb.len() && xb[j] == prev_x {
        height_b += yb[j];
        j += 1;
    }

    while i < xa.len() || j < xb.len() {
        let next_x = match (xa.get(i), xb.get(j)) {
            (Some(&a), Some(&b)) => a.min(b),
            (Some(&a), None) => a,
            (None, Some(&b)) => b,
            (None, None) => unreachable!(),
        };

        let width = next_x - prev_x;
        if width > 0.0 {
            let diff = height_a - height_b;
            acc += diff * diff * width;
        }

        while i < xa.len() && xa[i] == next_x {
            height_a += ya[i];
            i += 1;
        }
        while j < xb.len() && xb[j] == next_x {
            height_b += yb[j];
            j += 1;
        }
        prev_x = next_x;
    }

    acc
}

/// `SLB(x, y) = 0.5 * sqrt(L2(F_x, F_y))` where `F_x`, `F_y` are the
/// inverse-CDF step functions of `x` and `y`.
pub fn slb(x: &MMSpace, y: &MMSpace) -> f64 {
    let (fx, ux) = x.distance_inverse_cdf();
    let (fy, uy) = y.distance_inverse_cdf();
    let l2_sq = step_function_l2_sq(&fx, &ux, &fy, &uy);
    0.5 * l2_sq.max(0.0).sqrt()
}

/// Full pairwise SLB matrix over a population of cells, dispatched in
/// parallel over unordered pairs `(i, j)`, `i < j`.
pub fn slb_all(cells: &[MMSpace], chunksize: usize, dispatcher: &impl Dispatcher) -> SquareMatrix {
    let n = cells.len();
    let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push((i, j));
        }
    }

    let results = dispatcher.map_unordered(cells, &pairs, chunksize, |cells, &(i, j)| {
        slb(&cells[i], &cells[j])
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
    use crate::matrix::SquareMatrix;
    use crate::mmspace::{uniform, MMSpace};

    fn square(n: usize, rows: &[&[f64]]) -> SquareMatrix {
        let mut data = Vec::with_capacity(n * n);
        for row in rows {
            data.extend_from_slice(row);
        }
        SquareMatrix::from_row_major(n, data)
    }

    #[test]
    fn self_distance_is_zero() {
        let d = square(3, &[&[0.0, 1.0, 2.0], &[1.0, 0.0, 1.0], &[2.0, 1.0, 0.0]]);
        let a = MMSpace::new(None, d.clone(), uniform(3)).unwrap();
        let b = MMSpace::new(None, d, uniform(3)).unwrap();
        assert!(slb(&a, &b).abs() < 1e-12);
    }

    #[test]
    fn is_symmetric_and_nonnegative() {
        let da = square(3, &[&[0.0, 1.0, 2.0], &[1.0, 0.0, 1.0], &[2.0, 1.0, 0.0]]);
        let db = square(3, &[&[0.0, 2.0, 3.0], &[2.0, 0.0, 1.0], &[3.0, 1.0, 0.0]]);
        let a = MMSpace::new(None, da, uniform(3)).unwrap();
        let b = MMSpace::new(None, db, uniform(3)).unwrap();
        let ab = slb(&a, &b);
        let ba = slb(&b, &a);
        assert!(ab >= 0.0);
        assert!((ab - ba).abs() < 1e-12);
    }

    #[test]
    fn differs_for_distinct_shapes() {
        let da = square(3, &[&[0.0, 1.0, 2.0], &[1.0, 0.0, 1.0], &[2.0, 1.0, 0.0]]);
        let db = square(3, &[&[0.0, 10.0, 20.0], &[10.0, 0.0, 10.0], &[20.0, 10.0, 0.0]]);
        let a = MMSpace::new(None, da, uniform(3)).unwrap();
        let b = MMSpace::new(None, db, uniform(3)).unwrap();
        assert!(slb(&a, &b) > 0.0);
    }
}
