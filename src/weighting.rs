//! Per-reading reweighting of the complete-witness matrix.
//!
//! A reweighter learns one non-negative multiplier per reading row from the
//! complete witnesses only. The same multipliers are then applied to the
//! fragmentary rows so both sides of the classification share a scale.

use nalgebra::DMatrix;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeightingError {
    #[error("matrix has no witness columns")]
    NoWitnesses,
    #[error("negative or non-finite entry at row {row}, column {col}")]
    InvalidEntry { row: usize, col: usize },
    #[error("reweighter returned {got} weights for {expected} readings")]
    LengthMismatch { expected: usize, got: usize },
    #[error("weight for row {row} is negative or non-finite: {weight}")]
    InvalidWeight { row: usize, weight: f64 },
}

pub trait Reweighter: Send + Sync {
    /// One multiplier per row of `matrix` (readings × complete witnesses).
    fn fit(&self, matrix: &DMatrix<f64>) -> Result<Vec<f64>, WeightingError>;
}

/// Inverse document frequency with witnesses as documents: `ln(n / df)`.
///
/// A reading attested by every complete witness gets weight zero and is
/// dropped by the caller's pruning. Unsmoothed, so `df` is never inflated.
#[derive(Debug, Clone, Copy, Default)]
pub struct TfIdf;

impl Reweighter for TfIdf {
    fn fit(&self, matrix: &DMatrix<f64>) -> Result<Vec<f64>, WeightingError> {
        let n = matrix.ncols();
        if n == 0 {
            return Err(WeightingError::NoWitnesses);
        }

        let mut weights = Vec::with_capacity(matrix.nrows());
        for row in 0..matrix.nrows() {
            let mut df = 0usize;
            for col in 0..n {
                let value = matrix[(row, col)];
                if !value.is_finite() || value < 0.0 {
                    return Err(WeightingError::InvalidEntry { row, col });
                }
                if value > 0.0 {
                    df += 1;
                }
            }
            weights.push(if df == 0 {
                0.0
            } else {
                (n as f64 / df as f64).ln()
            });
        }
        Ok(weights)
    }
}
