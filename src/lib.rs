#![doc = include_str!("../README.md")]

pub mod clustering;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod gw;
pub mod io;
pub mod matrix;
pub mod mmspace;
pub mod ot;
pub mod qgw;
pub mod qmms;
pub mod slb;

pub use config::Config;
pub use controller::{RefinementController, RefinementOutcome};
pub use dispatcher::{Dispatcher, RayonDispatcher};
pub use error::{CellError, Result};
pub use io::{read_intracell_csv, write_qgw_csv, write_slb_csv, Cell, PairResult, ResultKind};
pub use matrix::{Plan, SquareMatrix};
pub use mmspace::MMSpace;
pub use qmms::QuantizedMMSpace;
pub use slb::slb_all;

/// Builds the `MMSpace`s a population of [`Cell`]s represents, using a
/// uniform measure for any cell whose `mu` wasn't supplied.
pub fn cells_to_mmspaces(cells: &[Cell]) -> Result<Vec<MMSpace>> {
    if cells.is_empty() {
        return Err(CellError::EmptyPopulation);
    }
    cells
        .iter()
        .map(|cell| {
            let mu = cell
                .mu
                .clone()
                .unwrap_or_else(|| mmspace::uniform(cell.n));
            MMSpace::new(Some(cell.name.clone()), cell.distance_matrix(), mu)
        })
        .collect()
}
