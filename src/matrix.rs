//! Flat, row-major square matrices.
//!
//! The teacher represents its forward index as flat packed buffers
//! (`Box<[u64]>` for packed postings, `Box<[usize]>` for block offsets)
//! rather than reaching for a dense-linear-algebra crate it does not
//! depend on; this crate follows the same convention for distance
//! matrices, transport plans, and the pair-result table.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquareMatrix {
    pub n: usize,
    data: Box<[f64]>,
}

impl SquareMatrix {
    pub fn zeros(n: usize) -> Self {
        SquareMatrix {
            n,
            data: vec![0.0; n * n].into_boxed_slice(),
        }
    }

    pub fn from_row_major(n: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), n * n, "data length must be n*n");
        SquareMatrix {
            n,
            data: data.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.n + j] = value;
    }

    #[inline]
    pub fn set_symmetric(&mut self, i: usize, j: usize, value: f64) {
        self.set(i, j, value);
        self.set(j, i, value);
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n..(i + 1) * self.n]
    }

    /// The strict upper triangle flattened in row-major order: `(0,1),
    /// (0,2), ..., (0,n-1), (1,2), ..., (n-2,n-1)`. Length `n*(n-1)/2`.
    pub fn upper_triangle_vectorform(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.n * self.n.saturating_sub(1) / 2);
        for i in 0..self.n {
            for j in (i + 1)..self.n {
                out.push(self.get(i, j));
            }
        }
        out
    }

    pub fn max_asymmetry(&self) -> f64 {
        let mut max_diff = 0.0_f64;
        for i in 0..self.n {
            for j in (i + 1)..self.n {
                let diff = (self.get(i, j) - self.get(j, i)).abs();
                if diff > max_diff {
                    max_diff = diff;
                }
            }
        }
        max_diff
    }
}

/// A dense `rows x cols` non-square matrix, used for transport plans
/// (row-sums = source measure, col-sums = target measure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub rows: usize,
    pub cols: usize,
    data: Box<[f64]>,
}

impl Plan {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Plan {
            rows,
            cols,
            data: vec![0.0; rows * cols].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] = value;
    }

    #[inline]
    pub fn add(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] += value;
    }

    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.rows).map(|i| self.data[i * self.cols..(i + 1) * self.cols].iter().sum()).collect()
    }

    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.cols];
        for i in 0..self.rows {
            for j in 0..self.cols {
                sums[j] += self.get(i, j);
            }
        }
        sums
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Nonzero entries as `(row, col, value)` triples.
    pub fn nonzeros(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.rows).flat_map(move |i| {
            (0..self.cols).filter_map(move |j| {
                let v = self.get(i, j);
                (v != 0.0).then_some((i, j, v))
            })
        })
    }
}
