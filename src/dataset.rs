//! Plaintext dataset handling on the data owner's side: CSV ingestion,
//! standardization, transposition and initial weights.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use crate::math::sampling::uniform_symmetric;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Line {line}, column {column}: cannot parse {value:?} as a number")]
    Parse {
        line: usize,
        column: usize,
        value: String,
    },

    #[error("Line {line}: expected {expected} columns, got {got}")]
    Ragged {
        line: usize,
        expected: usize,
        got: usize,
    },

    #[error("Dataset needs at least one row and two columns")]
    Empty,

    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// Feature matrix with one label per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    features: Vec<Vec<f64>>,
    labels: Vec<f64>,
}

impl Dataset {
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<f64>) -> DatasetResult<Self> {
        let cols = features.first().map(Vec::len).ok_or(DatasetError::Empty)?;
        if cols == 0 {
            return Err(DatasetError::Empty);
        }
        if labels.len() != features.len() {
            return Err(DatasetError::InvalidParameter {
                message: format!(
                    "{} labels for {} feature rows",
                    labels.len(),
                    features.len()
                ),
            });
        }
        if let Some((i, row)) = features.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(DatasetError::Ragged {
                line: i + 1,
                expected: cols,
                got: row.len(),
            });
        }
        Ok(Self { features, labels })
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> DatasetResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading dataset");
        let file = File::open(path)?;
        Self::from_csv_reader(BufReader::new(file))
    }

    /// Comma-separated values with one header record; the last column is the
    /// label. Fields may be quoted and padded with whitespace. Blank lines are
    /// skipped.
    pub fn from_csv_reader<R: Read>(reader: R) -> DatasetResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut features = Vec::new();
        let mut labels = Vec::new();
        let mut width: Option<usize> = None;

        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line() as usize);
            let mut row = record
                .iter()
                .enumerate()
                .map(|(column, cell)| {
                    cell.parse::<f64>().map_err(|_| DatasetError::Parse {
                        line,
                        column: column + 1,
                        value: cell.to_string(),
                    })
                })
                .collect::<DatasetResult<Vec<f64>>>()?;

            let expected = *width.get_or_insert(row.len());
            if row.len() != expected {
                return Err(DatasetError::Ragged {
                    line,
                    expected,
                    got: row.len(),
                });
            }
            if expected < 2 {
                return Err(DatasetError::Empty);
            }
            let label = row.pop().ok_or(DatasetError::Empty)?;
            labels.push(label);
            features.push(row);
        }

        debug!(rows = features.len(), "parsed csv");
        Self::new(features, labels)
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    pub fn rows(&self) -> usize {
        self.features.len()
    }

    pub fn cols(&self) -> usize {
        self.features[0].len()
    }

    /// Keeps only the first `rows` observations.
    pub fn truncate(&mut self, rows: usize) {
        self.features.truncate(rows.max(1));
        self.labels.truncate(rows.max(1));
    }

    /// Centers every feature column and divides by its population standard
    /// deviation. Constant columns are only centered.
    pub fn standardize(&mut self) {
        let n = self.rows() as f64;
        for j in 0..self.cols() {
            let mean = self.features.iter().map(|r| r[j]).sum::<f64>() / n;
            let var = self
                .features
                .iter()
                .map(|r| (r[j] - mean).powi(2))
                .sum::<f64>()
                / n;
            let std = var.sqrt();
            for row in &mut self.features {
                row[j] -= mean;
                if std > 0.0 {
                    row[j] /= std;
                }
            }
        }
    }

    pub fn transposed_features(&self) -> Vec<Vec<f64>> {
        transpose(&self.features)
    }
}

pub fn transpose(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let cols = matrix.first().map_or(0, Vec::len);
    (0..cols)
        .map(|j| matrix.iter().map(|row| row[j]).collect())
        .collect()
}

/// `cols` weights drawn uniformly from `[-bound, bound]`.
pub fn initial_weights<R: Rng + ?Sized>(
    cols: usize,
    bound: f64,
    rng: &mut R,
) -> DatasetResult<Vec<f64>> {
    uniform_symmetric(cols, bound, rng).map_err(|e| DatasetError::InvalidParameter {
        message: e.to_string(),
    })
}
