//! Run configuration.
//!
//! Mirrors the teacher's `Configuration` / strategy-enum builder pattern
//! (`inverted_index::Configuration`), but the six knobs here are all
//! scalar and recognized directly by the refinement controller rather
//! than dispatched through strategy enums, since there is only one
//! strategy per knob in this engine.

use serde::{Deserialize, Serialize};

/// Parameters recognized by the SLB/qGW pipeline (`spec.md` §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, clap::Args)]
pub struct Config {
    /// Target number of clusters per cell for the quantized representation.
    #[clap(long, default_value_t = 25)]
    pub num_clusters: usize,

    /// Worker pool size for the parallel dispatcher.
    #[clap(long, default_value_t = 1)]
    pub num_processes: usize,

    /// Desired k-NN confidence, in `[0, 1]`. `1.0` forces an exact k-NN
    /// graph; `0.0` permits maximum early termination.
    #[clap(long, default_value_t = 0.9)]
    pub accuracy: f64,

    /// `k` in the k-NN accuracy guarantee.
    #[clap(long, default_value_t = 10)]
    pub nearest_neighbors: usize,

    /// Dispatcher batch size.
    #[clap(long, default_value_t = 20)]
    pub chunksize: usize,

    /// Emit progress logging (posting-list style: a line per round/build step).
    #[clap(long, default_value_t = false)]
    pub verbose: bool,

    /// Seed for the agglomerative clustering's tie-breaking and any other
    /// incidental randomness. Not present in the original (which inherits
    /// whatever NumPy's global RNG state happens to be); added so runs are
    /// reproducible.
    #[clap(long, default_value_t = 0)]
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            num_clusters: 25,
            num_processes: 1,
            accuracy: 0.9,
            nearest_neighbors: 10,
            chunksize: 20,
            verbose: false,
            seed: 0,
        }
    }
}

impl Config {
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(0.0..=1.0).contains(&self.accuracy) {
            return Err(crate::error::CellError::InvalidConfig(format!(
                "accuracy must be in [0, 1], got {}",
                self.accuracy
            )));
        }
        if self.nearest_neighbors == 0 {
            return Err(crate::error::CellError::InvalidConfig(
                "nearest_neighbors must be >= 1".to_string(),
            ));
        }
        if self.num_clusters == 0 {
            return Err(crate::error::CellError::InvalidConfig(
                "num_clusters must be >= 1".to_string(),
            ));
        }
        if self.chunksize == 0 {
            return Err(crate::error::CellError::InvalidConfig(
                "chunksize must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}
