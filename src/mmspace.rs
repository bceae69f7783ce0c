//! Metric-measure spaces: the unit of data this crate compares.

use crate::error::{CellError, DisplayName, Result};
use crate::matrix::SquareMatrix;

const SYMMETRY_TOL: f64 = 1e-9;
const MEASURE_SUM_TOL: f64 = 1e-7;

/// A finite metric-measure space: a square, symmetric, zero-diagonal
/// distance matrix `d` paired with a probability vector `mu`.
///
/// Immutable once constructed; `c_a`, the sorted CDF pair and the
/// vectorform permutation are computed eagerly since every downstream
/// consumer (SLB, qMMS builder) needs them.
#[derive(Debug, Clone)]
pub struct MMSpace {
    pub name: Option<String>,
    pub n: usize,
    pub d: SquareMatrix,
    pub mu: Vec<f64>,
    /// `⟨μμᵀ, D⊙D⟩`, cached since both SLB and qMMS construction touch it.
    pub c_a: f64,
}

/// Uniform probability vector on `n` points (`1/n` each).
pub fn uniform(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

impl MMSpace {
    pub fn new(name: Option<String>, d: SquareMatrix, mu: Vec<f64>) -> Result<Self> {
        let n = d.n;
        let disp = || DisplayName(name.clone());

        if mu.len() != n {
            return Err(CellError::MeasureLengthMismatch(disp(), mu.len(), n));
        }
        if n < 2 {
            return Err(CellError::TooFewPoints(disp(), n));
        }
        for i in 0..n {
            if d.get(i, i) != 0.0 {
                return Err(CellError::NotSymmetric(disp(), d.get(i, i).abs()));
            }
        }
        for v in d.as_slice() {
            if !v.is_finite() || *v < 0.0 {
                return Err(CellError::NonFinite(disp()));
            }
        }
        let max_asym = d.max_asymmetry();
        if max_asym > SYMMETRY_TOL {
            return Err(CellError::NotSymmetric(disp(), max_asym));
        }
        for &m in &mu {
            if !m.is_finite() || m < 0.0 {
                return Err(CellError::BadMeasure(disp(), m));
            }
        }
        let sum: f64 = mu.iter().sum();
        if (sum - 1.0).abs() > MEASURE_SUM_TOL {
            return Err(CellError::BadMeasure(disp(), sum));
        }

        let c_a = frobenius_moment(&d, &mu);

        Ok(MMSpace { name, n, d, mu, c_a })
    }

    /// `(dsort, order)`: the strict upper triangle of `d`, sorted ascending,
    /// and the permutation `order` such that `dsort[k] == flat[order[k]]`
    /// where `flat` is the un-sorted row-major upper-triangle flattening.
    /// Ties in distance are broken by original (row-major) index.
    pub fn sorted_vectorform(&self) -> (Vec<f64>, Vec<usize>) {
        sorted_vectorform(&self.d)
    }

    /// `(f, u)`: the inverse CDF pair of `spec.md` §4.1. `f[k]` is the
    /// k-th smallest inter-point distance (`f[0] == 0`); `u[k]` is the
    /// total probability mass of point-pairs at that distance, under the
    /// quotient measure on unordered pairs (off-diagonal pairs counted
    /// with weight `2*mu_i*mu_j` so that `sum(u) == 1`, matching the
    /// explicit CDF invariant in the data model).
    pub fn distance_inverse_cdf(&self) -> (Vec<f64>, Vec<f64>) {
        distance_inverse_cdf(&self.d, &self.mu)
    }
}

/// `⟨μμᵀ, D⊙D⟩ = Σ_ij D[i,j]² μ[i] μ[j]`.
pub fn frobenius_moment(d: &SquareMatrix, mu: &[f64]) -> f64 {
    let n = d.n;
    let mut acc = 0.0;
    for i in 0..n {
        let row = d.row(i);
        let mu_i = mu[i];
        let mut row_acc = 0.0;
        for j in 0..n {
            row_acc += row[j] * row[j] * mu[j];
        }
        acc += mu_i * row_acc;
    }
    acc
}

pub fn sorted_vectorform(d: &SquareMatrix) -> (Vec<f64>, Vec<usize>) {
    let flat = d.upper_triangle_vectorform();
    let mut order: Vec<usize> = (0..flat.len()).collect();
    order.sort_by(|&a, &b| {
        flat[a]
            .partial_cmp(&flat[b])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    let dsort = order.iter().map(|&k| flat[k]).collect();
    (dsort, order)
}

pub fn distance_inverse_cdf(d: &SquareMatrix, mu: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = d.n;
    let (dsort, order) = sorted_vectorform(d);

    // mu (x) mu, strict upper triangle, same row-major enumeration as
    // `upper_triangle_vectorform`, doubled since each class {i,j}, i != j,
    // covers both ordered pairs (i,j) and (j,i).
    let mut prod_flat = Vec::with_capacity(dsort.len());
    for i in 0..n {
        for j in (i + 1)..n {
            prod_flat.push(2.0 * mu[i] * mu[j]);
        }
    }
    let reordered_prod: Vec<f64> = order.iter().map(|&k| prod_flat[k]).collect();

    let mut f = Vec::with_capacity(dsort.len() + 1);
    f.push(0.0);
    f.extend(dsort);

    let mut u = Vec::with_capacity(reordered_prod.len() + 1);
    let diag_mass: f64 = mu.iter().map(|m| m * m).sum();
    u.push(diag_mass);
    u.extend(reordered_prod);

    (f, u)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(n: usize, rows: &[&[f64]]) -> SquareMatrix {
        let mut data = Vec::with_capacity(n * n);
        for row in rows {
            data.extend_from_slice(row);
        }
        SquareMatrix::from_row_major(n, data)
    }

    #[test]
    fn rejects_non_square_via_measure_mismatch() {
        let d = SquareMatrix::from_row_major(2, vec![0.0, 1.0, 1.0, 0.0]);
        let err = MMSpace::new(None, d, vec![1.0 / 3.0; 3]);
        assert!(matches!(err, Err(CellError::MeasureLengthMismatch(_, 3, 2))));
    }

    #[test]
    fn rejects_asymmetric() {
        let d = square(3, &[&[0.0, 1.0, 2.0], &[1.0, 0.0, 1.0], &[2.0, 5.0, 0.0]]);
        let err = MMSpace::new(None, d, uniform(3));
        assert!(matches!(err, Err(CellError::NotSymmetric(_, _))));
    }

    #[test]
    fn rejects_bad_measure_sum() {
        let d = square(3, &[&[0.0, 1.0, 2.0], &[1.0, 0.0, 1.0], &[2.0, 1.0, 0.0]]);
        let err = MMSpace::new(None, d, vec![0.5, 0.5, 0.5]);
        assert!(matches!(err, Err(CellError::BadMeasure(_, _))));
    }

    #[test]
    fn inverse_cdf_mass_sums_to_one() {
        let d = square(3, &[&[0.0, 1.0, 2.0], &[1.0, 0.0, 1.0], &[2.0, 1.0, 0.0]]);
        let mms = MMSpace::new(None, d, uniform(3)).unwrap();
        let (f, u) = mms.distance_inverse_cdf();
        assert_eq!(f.len(), u.len());
        let total: f64 = u.iter().sum();
        assert!((total - 1.0).abs() < 1e-12, "total = {total}");
        assert!(f.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn three_point_line_matches_hand_computation() {
        // D = [[0,1,2],[1,0,1],[2,1,0]], uniform measure.
        let d = square(3, &[&[0.0, 1.0, 2.0], &[1.0, 0.0, 1.0], &[2.0, 1.0, 0.0]]);
        let mms = MMSpace::new(None, d, uniform(3)).unwrap();
        let (f, _u) = mms.distance_inverse_cdf();
        assert_eq!(f, vec![0.0, 1.0, 1.0, 2.0]);
    }
}
