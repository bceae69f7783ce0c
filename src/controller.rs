//! Adaptive k-nearest-neighbor refinement controller.
//!
//! Round 0 seeds the real (q)GW table with each cell's `nearest_neighbors`
//! closest-by-SLB candidates. Every later round estimates, from the
//! empirical distribution of `qgw - slb` error observed so far, which
//! remaining pairs are at risk of distorting the final k-NN graph, and
//! computes exactly those — stopping once the expected number of such
//! "injuries" falls under the `accuracy` budget.

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::matrix::SquareMatrix;
use crate::mmspace::MMSpace;
use crate::qgw::qgw;
use crate::qmms::QuantizedMMSpace;
use crate::slb::slb_all;
use log::info;
use std::collections::HashSet;

const BINS: usize = 200;

/// The outcome of a refinement run: the SLB matrix (always fully
/// known), the best available qGW estimate for every pair (exact where
/// computed, `slb + median_error` elsewhere), and which entries are
/// exact.
pub struct RefinementOutcome {
    pub n: usize,
    pub slb: SquareMatrix,
    pub estimate: SquareMatrix,
    known: Vec<bool>,
}

impl RefinementOutcome {
    pub fn is_known(&self, i: usize, j: usize) -> bool {
        self.known[i * self.n + j]
    }
}

pub struct RefinementController<'a> {
    config: &'a Config,
}

impl<'a> RefinementController<'a> {
    pub fn new(config: &'a Config) -> Self {
        RefinementController { config }
    }

    pub fn run(&self, cells: &[MMSpace], dispatcher: &impl Dispatcher) -> Result<RefinementOutcome> {
        self.config.validate()?;
        let n = cells.len();
        let slb = slb_all(cells, self.config.chunksize, dispatcher);

        let quantized: Vec<QuantizedMMSpace> = cells
            .iter()
            .map(|c| QuantizedMMSpace::from_num_clusters(c, self.config.num_clusters, self.config.seed))
            .collect::<Result<Vec<_>>>()?;

        let mut qgw_dmat = SquareMatrix::zeros(n);
        let mut known = vec![false; n * n];
        for i in 0..n {
            known[i * n + i] = true;
        }

        let mut round = 0usize;
        let max_rounds = n.max(1) + 1;
        loop {
            let candidates = if round == 0 {
                seed_round(n, &slb, self.config.nearest_neighbors)
            } else {
                steady_round(
                    n,
                    &slb,
                    &qgw_dmat,
                    &known,
                    self.config.accuracy,
                    self.config.nearest_neighbors,
                )
            };
            if candidates.is_empty() {
                break;
            }
            round += 1;
            if self.config.verbose {
                info!("refinement round {round}: computing {} pairs", candidates.len());
            }

            let results =
                dispatcher.map_unordered(&quantized, &candidates, self.config.chunksize, |cells, &(i, j)| {
                    qgw(&cells[i], &cells[j], None).1
                });
            for (&(i, j), dist) in candidates.iter().zip(results) {
                qgw_dmat.set_symmetric(i, j, dist);
                known[i * n + j] = true;
                known[j * n + i] = true;
            }

            if round >= max_rounds {
                log::warn!("refinement controller hit its round cap ({max_rounds}); stopping");
                break;
            }
        }

        let median_error = median_known_error(n, &slb, &qgw_dmat, &known);
        let mut estimate = qgw_dmat.clone();
        for i in 0..n {
            for j in 0..n {
                if !known[i * n + j] {
                    estimate.set(i, j, slb.get(i, j) + median_error);
                }
            }
        }

        Ok(RefinementOutcome {
            n,
            slb,
            estimate,
            known,
        })
    }
}

/// Every cell's `nn` nearest neighbors by SLB, deduped to unordered
/// pairs. Run once, before any real (q)GW distance is known.
fn seed_round(n: usize, slb: &SquareMatrix, nn: usize) -> Vec<(usize, usize)> {
    let mut pairs = HashSet::new();
    for i in 0..n {
        let mut others: Vec<usize> = (0..n).filter(|&j| j != i).collect();
        others.sort_by(|&a, &b| {
            slb.get(i, a)
                .partial_cmp(&slb.get(i, b))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        for &j in others.iter().take(nn) {
            pairs.insert(if i < j { (i, j) } else { (j, i) });
        }
    }
    let mut out: Vec<(usize, usize)> = pairs.into_iter().collect();
    out.sort();
    out
}

fn quantile_linear(sorted_vals: &[f64], q: f64) -> f64 {
    let n = sorted_vals.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted_vals[0];
    }
    let pos = q * (n as f64 - 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted_vals[lo]
    } else {
        let frac = pos - lo as f64;
        sorted_vals[lo] * (1.0 - frac) + sorted_vals[hi] * frac
    }
}

fn digitize(x: f64, bin_edges: &[f64]) -> usize {
    bin_edges.partition_point(|&v| v <= x)
}

/// Picks the next batch of pairs to compute exactly, using the
/// empirical `qgw - slb` error distribution observed so far to bound
/// the expected number of k-NN "injuries" left uncomputed.
fn steady_round(
    n: usize,
    slb: &SquareMatrix,
    qgw_dmat: &SquareMatrix,
    known: &[bool],
    accuracy: f64,
    nn: usize,
) -> Vec<(usize, usize)> {
    let mut errors: Vec<f64> = Vec::new();
    for i in 0..n {
        for j in 0..n {
            if i != j && known[i * n + j] {
                let g = qgw_dmat.get(i, j);
                if g > 0.0 {
                    errors.push(g - slb.get(i, j));
                }
            }
        }
    }
    if errors.is_empty() {
        return Vec::new();
    }
    errors.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let error_quantiles: Vec<f64> = (0..=BINS)
        .map(|k| quantile_linear(&errors, k as f64 / BINS as f64))
        .collect();
    let median = error_quantiles[BINS / 2];

    let mut cutoff = vec![0.0_f64; n];
    for i in 0..n {
        let mut row_vals: Vec<f64> = (0..n)
            .map(|j| {
                if known[i * n + j] {
                    qgw_dmat.get(i, j)
                } else {
                    slb.get(i, j) + median
                }
            })
            .collect();
        row_vals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let k = (nn + 1).min(n - 1);
        cutoff[i] = row_vals[k];
    }

    let acceptable_injuries = nn as f64 * n as f64 * (1.0 - accuracy);

    let mut xs: Vec<(usize, usize)> = Vec::new();
    for i in 0..n {
        for j in 0..n {
            if i != j && !known[i * n + j] && slb.get(i, j) <= cutoff[i] {
                xs.push((i, j));
            }
        }
    }
    if xs.is_empty() {
        return Vec::new();
    }

    let thresholds: Vec<f64> = xs.iter().map(|&(i, j)| (cutoff[i] - slb.get(i, j)).max(0.0)).collect();
    let quantiles: Vec<f64> = thresholds
        .iter()
        .map(|&t| digitize(t, &error_quantiles) as f64 / BINS as f64)
        .collect();

    let mut index_sort: Vec<usize> = (0..xs.len()).collect();
    index_sort.sort_by(|&a, &b| {
        thresholds[a]
            .partial_cmp(&thresholds[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut sq = quantiles.clone();
    sq.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mut cumsum = 0.0;
    let mut k1 = sq.len();
    for (idx, &v) in sq.iter().enumerate() {
        cumsum += v;
        if cumsum >= acceptable_injuries {
            k1 = idx;
            break;
        }
    }
    let k2 = sq.partition_point(|&v| v < 0.5);
    let k = k1.min(k2);

    let candidate_count = xs.len();
    if k >= candidate_count {
        return Vec::new();
    }

    let block_size = n * 5;
    let from_index = if candidate_count - k < block_size {
        k
    } else {
        (candidate_count + k) / 2
    };

    let mut selected: Vec<(usize, usize)> = index_sort[from_index..].iter().map(|&idx| xs[idx]).collect();
    if selected.is_empty() {
        // Guarantees forward progress even if block-size arithmetic ever
        // rounds `from_index` up to `candidate_count`.
        selected.push(xs[*index_sort.last().unwrap()]);
    }

    let mut pairs = HashSet::new();
    for (i, j) in selected {
        pairs.insert(if i < j { (i, j) } else { (j, i) });
    }
    let mut out: Vec<(usize, usize)> = pairs.into_iter().collect();
    out.sort();
    out
}

fn median_known_error(n: usize, slb: &SquareMatrix, qgw_dmat: &SquareMatrix, known: &[bool]) -> f64 {
    let mut vals: Vec<f64> = Vec::new();
    for i in 0..n {
        for j in 0..n {
            if known[i * n + j] {
                vals.push(qgw_dmat.get(i, j) - slb.get(i, j));
            }
        }
    }
    if vals.is_empty() {
        return 0.0;
    }
    vals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    quantile_linear(&vals, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::RayonDispatcher;
    use crate::matrix::SquareMatrix;
    use crate::mmspace::uniform;

    fn square(n: usize, rows: &[&[f64]]) -> SquareMatrix {
        let mut data = Vec::with_capacity(n * n);
        for row in rows {
            data.extend_from_slice(row);
        }
        SquareMatrix::from_row_major(n, data)
    }

    fn triangle(scale: f64) -> MMSpace {
        let d = square(
            3,
            &[&[0.0, 1.0, 2.0], &[1.0, 0.0, 1.0], &[2.0, 1.0, 0.0]],
        );
        let scaled: Vec<f64> = d.as_slice().iter().map(|v| v * scale).collect();
        MMSpace::new(None, SquareMatrix::from_row_major(3, scaled), uniform(3)).unwrap()
    }

    #[test]
    fn seed_round_picks_nn_neighbors_per_row() {
        let slb = square(
            4,
            &[
                &[0.0, 1.0, 2.0, 3.0],
                &[1.0, 0.0, 1.0, 2.0],
                &[2.0, 1.0, 0.0, 1.0],
                &[3.0, 2.0, 1.0, 0.0],
            ],
        );
        let pairs = seed_round(4, &slb, 1);
        // Each point's single nearest neighbor: 0->1, 1->0 or 2 (tie), 2->1 or 3 (tie), 3->2.
        assert!(pairs.contains(&(0, 1)));
        assert!(pairs.contains(&(2, 3)));
    }

    #[test]
    fn full_run_terminates_and_covers_all_pairs() {
        let cells = vec![triangle(1.0), triangle(1.0), triangle(5.0), triangle(5.0)];
        let config = Config {
            num_clusters: 2,
            num_processes: 1,
            accuracy: 0.5,
            nearest_neighbors: 1,
            chunksize: 4,
            verbose: false,
            seed: 0,
        };
        let dispatcher = RayonDispatcher::new(1, false);
        let controller = RefinementController::new(&config);
        let outcome = controller.run(&cells, &dispatcher).unwrap();

        assert_eq!(outcome.n, 4);
        for i in 0..4 {
            assert!(outcome.is_known(i, i));
        }
        // The identical pair (0,1) should end up known from the seed round.
        assert!(outcome.is_known(0, 1));
    }
}
