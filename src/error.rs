//! Crate-wide error type.
//!
//! Library code returns [`Result<_, CellError>`]; only the CLI binaries
//! unwrap or exit on error.

use std::fmt;

/// Name of the offending cell, when one is known at the point of failure.
pub type CellName = Option<String>;

#[derive(thiserror::Error, Debug)]
pub enum CellError {
    #[error("distance matrix for cell {0} is not square ({1}x{2})")]
    NotSquare(DisplayName, usize, usize),

    #[error("distance matrix for cell {0} is not symmetric (max asymmetry {1:e} > 1e-9)")]
    NotSymmetric(DisplayName, f64),

    #[error("distance matrix for cell {0} contains a NaN or infinite entry")]
    NonFinite(DisplayName),

    #[error("measure for cell {0} sums to {1} (expected 1 within 1e-7)")]
    BadMeasure(DisplayName, f64),

    #[error("measure for cell {0} has length {1}, expected {2}")]
    MeasureLengthMismatch(DisplayName, usize, usize),

    #[error("cell {0} has {1} points, at least 2 are required")]
    TooFewPoints(DisplayName, usize),

    #[error("num_clusters must be >= 1 and <= n ({n}), got {num_clusters}")]
    BadClusterCount { num_clusters: usize, n: usize },

    #[error("cluster labels must be 0..K contiguous and cover all {n} points, got {msg}")]
    BadLabels { n: usize, msg: String },

    #[error("cell population must have at least one cell")]
    EmptyPopulation,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed intracell CSV at line {line}: {msg}")]
    MalformedCsv { line: usize, msg: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A thin `Display` wrapper so `Option<String>` prints as `<unnamed>` in error messages
/// instead of Rust's `None`/`Some("...")` debug form.
#[derive(Debug, Clone)]
pub struct DisplayName(pub CellName);

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => write!(f, "{name:?}"),
            None => write!(f, "<unnamed>"),
        }
    }
}

impl From<Option<&str>> for DisplayName {
    fn from(name: Option<&str>) -> Self {
        DisplayName(name.map(str::to_owned))
    }
}

pub type Result<T> = std::result::Result<T, CellError>;
