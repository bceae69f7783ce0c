//! Parallel dispatch over independent `(i, j)` work items.
//!
//! The teacher builds posting lists with
//! `postings.par_iter().progress_count(n)` (`rayon` + `indicatif`'s
//! `ParallelProgressIterator`); this module generalizes that pattern to
//! arbitrary keyed work, returning results in the same order as the
//! input keys rather than completion order, so callers never have to
//! re-sort by `(i, j)`.

use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;

/// Dispatches `f` over `keys`, sharing `payload` by reference across
/// workers. No process-global state: every worker borrows the same
/// `payload`, so nothing needs to be re-initialized per worker the way
/// a process pool would need an `initializer`.
pub trait Dispatcher: Sync {
    fn map_unordered<P, K, R, F>(&self, payload: &P, keys: &[K], chunksize: usize, f: F) -> Vec<R>
    where
        P: Sync,
        K: Sync,
        R: Send,
        F: Fn(&P, &K) -> R + Sync + Send;
}

/// The default dispatcher: a `rayon` thread pool sized by
/// `num_processes`, with an optional `indicatif` progress bar.
pub struct RayonDispatcher {
    pool: rayon::ThreadPool,
    verbose: bool,
}

impl RayonDispatcher {
    pub fn new(num_processes: usize, verbose: bool) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_processes.max(1))
            .build()
            .expect("failed to build rayon thread pool");
        RayonDispatcher { pool, verbose }
    }
}

impl Dispatcher for RayonDispatcher {
    fn map_unordered<P, K, R, F>(&self, payload: &P, keys: &[K], chunksize: usize, f: F) -> Vec<R>
    where
        P: Sync,
        K: Sync,
        R: Send,
        F: Fn(&P, &K) -> R + Sync + Send,
    {
        let chunksize = chunksize.max(1);
        self.pool.install(|| {
            if self.verbose {
                let bar = ProgressBar::new(keys.len() as u64);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{bar:40.cyan/blue} {pos}/{len} pairs ({eta})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                keys.par_iter()
                    .with_min_len(chunksize)
                    .progress_with(bar)
                    .map(|k| f(payload, k))
                    .collect()
            } else {
                keys.par_iter()
                    .with_min_len(chunksize)
                    .map(|k| f(payload, k))
                    .collect()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_key_order() {
        let dispatcher = RayonDispatcher::new(2, false);
        let payload = 10i64;
        let keys: Vec<i64> = (0..50).collect();
        let results = dispatcher.map_unordered(&payload, &keys, 4, |p, k| p + k);
        let expected: Vec<i64> = keys.iter().map(|k| payload + k).collect();
        assert_eq!(results, expected);
    }
}
