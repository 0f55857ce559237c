//! Row-major numeric feature matrix: the only contract between the
//! feature projector and the anomaly engine.

use crate::error::{DetectError, DetectResult};

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    data: Vec<f64>,
    n_rows: usize,
}

impl FeatureMatrix {
    /// Build from rows. Every row must have one value per column and
    /// every value must be finite.
    pub fn from_rows(columns: Vec<String>, rows: &[Vec<f64>]) -> DetectResult<Self> {
        let n_cols = columns.len();
        if n_cols == 0 {
            return Err(DetectError::DataShape { expected: 1, actual: 0 });
        }
        let mut data = Vec::with_capacity(rows.len() * n_cols);
        for (r, row) in rows.iter().enumerate() {
            if row.len() != n_cols {
                return Err(DetectError::DataShape { expected: n_cols, actual: row.len() });
            }
            if let Some(c) = row.iter().position(|v| !v.is_finite()) {
                return Err(DetectError::NonFiniteFeature { row: r, column: c });
            }
            data.extend_from_slice(row);
        }
        Ok(Self { columns, data, n_rows: rows.len() })
    }

    /// Matrix with generated column names `f0..fN`.
    pub fn from_unnamed_rows(rows: &[Vec<f64>]) -> DetectResult<Self> {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let columns = (0..width).map(|i| format!("f{i}")).collect();
        Self::from_rows(columns, rows)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let w = self.n_cols();
        &self.data[i * w..(i + 1) * w]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.n_cols())
    }

    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n_cols() + col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_rows() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        let err = FeatureMatrix::from_unnamed_rows(&rows).unwrap_err();
        assert!(matches!(err, DetectError::DataShape { expected: 2, actual: 1 }));
    }

    #[test]
    fn rejects_nan() {
        let rows = vec![vec![1.0, 2.0], vec![f64::NAN, 0.0]];
        let err = FeatureMatrix::from_unnamed_rows(&rows).unwrap_err();
        assert!(matches!(err, DetectError::NonFiniteFeature { row: 1, column: 0 }));
    }

    #[test]
    fn row_access() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let m = FeatureMatrix::from_unnamed_rows(&rows).unwrap();
        assert_eq!(m.n_rows(), 3);
        assert_eq!(m.row(1), &[3.0, 4.0]);
        assert_eq!(m.value(2, 1), 6.0);
        assert_eq!(m.rows().count(), 3);
    }
}
