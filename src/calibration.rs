use crate::error::{CalError, CalResult};
use crate::instance::Instance;
use nalgebra::DMatrix;

/// Entries with magnitude below this are treated as structural zeros.
pub const ZERO_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SparseRow {
    pub indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl SparseRow {
    pub fn from_dense(values: impl IntoIterator<Item = f64>) -> Self {
        let mut row = SparseRow::default();
        for (i, x) in values.into_iter().enumerate() {
            if x.abs() > ZERO_TOLERANCE {
                row.indices.push(i);
                row.values.push(x);
            }
        }
        row
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn dot(&self, v: &[f64]) -> f64 {
        self.iter().map(|(i, x)| x * v[i]).sum()
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }
}

/// The p auxiliary rows followed by the dense cardinality row.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSystem {
    rows: Vec<SparseRow>,
    columns: usize,
}

impl CalibrationSystem {
    pub fn new(columns: usize, auxiliary: Vec<SparseRow>) -> CalResult<Self> {
        for (r, row) in auxiliary.iter().enumerate() {
            if row.indices.len() != row.values.len() {
                return Err(CalError::Instance(format!(
                    "calibration row {} has mismatched index and value counts",
                    r
                )));
            }
            if let Some(&bad) = row.indices.iter().find(|&&i| i >= columns) {
                return Err(CalError::Instance(format!(
                    "calibration row {} references unit {} outside [0, {})",
                    r, bad, columns
                )));
            }
        }

        let mut rows = auxiliary;
        rows.push(SparseRow {
            indices: (0..columns).collect(),
            values: vec![1.0; columns],
        });
        Ok(Self { rows, columns })
    }

    pub fn from_instance(instance: &Instance) -> CalResult<Self> {
        let p = instance.n_calibration;
        let auxiliary = (0..p)
            .map(|j| SparseRow::from_dense((0..instance.population).map(|i| instance.x(i, j))))
            .collect();
        Self::new(instance.population, auxiliary)
    }

    pub fn rows(&self) -> &[SparseRow] {
        &self.rows
    }

    pub fn auxiliary(&self) -> &[SparseRow] {
        &self.rows[..self.rows.len() - 1]
    }

    pub fn cardinality(&self) -> &SparseRow {
        &self.rows[self.rows.len() - 1]
    }

    /// p + 1
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns
    }

    pub fn nnz(&self) -> usize {
        self.rows.iter().map(SparseRow::nnz).sum()
    }

    /// A·v over all columns.
    pub fn apply(&self, v: &[f64]) -> Vec<f64> {
        self.rows.iter().map(|row| row.dot(v)).collect()
    }

    /// Population totals Σ_i x_ji of each auxiliary vector.
    pub fn totals(&self) -> Vec<f64> {
        self.auxiliary().iter().map(SparseRow::sum).collect()
    }

    /// Dense copy restricted to the columns flagged in `keep`.
    pub fn dense(&self, keep: &[bool]) -> DMatrix<f64> {
        let mut a = DMatrix::zeros(self.rows.len(), self.columns);
        for (r, row) in self.rows.iter().enumerate() {
            for (c, x) in row.iter() {
                if keep[c] {
                    a[(r, c)] = x;
                }
            }
        }
        a
    }

    pub fn rank(&self, tolerance: f64) -> usize {
        self.dense(&vec![true; self.columns]).rank(tolerance)
    }
}
